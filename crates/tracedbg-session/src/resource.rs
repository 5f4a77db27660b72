//! Standing resource subscriptions, refreshed once per pause.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use tracedbg_net::{MessageSink, NetError};
use tracedbg_proto::{ContextObjectName, ObjectType, RequestPayload, Resource};

use crate::request::{HandlerId, RequestManager};

/// Error text delivered when the peer succeeds without attaching a snapshot.
pub const EMPTY_REPLY: &str = "reply carried no resource";

/// Consumer of one subscription's snapshots.
pub trait ResourceListener {
    fn on_update(&self, resource: &Resource);
    fn on_error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Subscription {
    name: ContextObjectName,
    object_type: ObjectType,
    handler: HandlerId,
    listener: Rc<dyn ResourceListener>,
}

/// Keeps the active listeners and re-queries all of them on demand.
///
/// Each listener owns its own request handler, so two listeners on the same
/// object are refreshed by two independent requests.
#[derive(Default)]
pub struct ResourceManager {
    next_id: u64,
    subscriptions: BTreeMap<ListenerId, Subscription>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `name`. Nothing is sent until the next refresh.
    pub fn subscribe(
        &mut self,
        requests: &mut RequestManager,
        name: ContextObjectName,
        object_type: ObjectType,
        listener: Rc<dyn ResourceListener>,
    ) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.subscriptions.insert(
            id,
            Subscription {
                name,
                object_type,
                handler: requests.register_handler(),
                listener,
            },
        );
        debug!(?id, %name, %object_type, "subscribed");
        id
    }

    /// Drop a listener along with any of its requests still in flight.
    pub fn unsubscribe(&mut self, requests: &mut RequestManager, id: ListenerId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(sub) => {
                let dropped = requests.unregister(sub.handler);
                debug!(?id, dropped, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Issue one query per listener; returns how many were sent.
    pub fn refresh_all<S: MessageSink + ?Sized>(
        &mut self,
        requests: &mut RequestManager,
        sink: &mut S,
    ) -> Result<usize, NetError> {
        for sub in self.subscriptions.values() {
            let listener = Rc::clone(&sub.listener);
            let expected = sub.object_type;
            requests.issue(
                sink,
                sub.handler,
                RequestPayload::query(sub.object_type, sub.name),
                move |reply| match reply.into_result() {
                    Ok(Some(resource)) if resource.object_type() == expected => {
                        listener.on_update(&resource)
                    }
                    Ok(Some(resource)) => listener.on_error(&format!(
                        "expected a {} snapshot, got {}",
                        expected,
                        resource.object_type()
                    )),
                    Ok(None) => listener.on_error(EMPTY_REPLY),
                    Err(message) => listener.on_error(&message),
                },
            )?;
        }
        Ok(self.subscriptions.len())
    }

    /// What a listener is subscribed to.
    pub fn subscription(&self, id: ListenerId) -> Option<(ContextObjectName, ObjectType)> {
        self.subscriptions
            .get(&id)
            .map(|sub| (sub.name, sub.object_type))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
