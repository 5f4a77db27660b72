//! Request/reply correlation.
//!
//! Tracks outbound requests by id and routes each reply to the callback
//! registered when the request was issued. Replies for ids nobody waits on
//! any more are dropped quietly.

use std::collections::HashMap;

use tracing::debug;

use tracedbg_net::{MessageSink, NetError};
use tracedbg_proto::{Request, RequestId, RequestPayload, RequestReply};

/// Completion callback for one request.
pub type ReplyCallback = Box<dyn FnOnce(RequestReply)>;

/// Owner of a group of pending requests, purged together by
/// [`RequestManager::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Pending {
    handler: HandlerId,
    on_reply: ReplyCallback,
}

/// Allocates request ids and maps them back to their callbacks.
pub struct RequestManager {
    next_request: RequestId,
    next_handler: u64,
    pending: HashMap<RequestId, Pending>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self {
            next_request: 1,
            next_handler: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate a fresh handler identity.
    pub fn register_handler(&mut self) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        id
    }

    /// Send `payload` as a new request on behalf of `handler`.
    ///
    /// `on_reply` runs at most once, when the matching reply arrives. If the
    /// send itself fails nothing is recorded and the id is not reused.
    pub fn issue<S, F>(
        &mut self,
        sink: &mut S,
        handler: HandlerId,
        payload: RequestPayload,
        on_reply: F,
    ) -> Result<RequestId, NetError>
    where
        S: MessageSink + ?Sized,
        F: FnOnce(RequestReply) + 'static,
    {
        let id = self.next_request;
        self.next_request += 1;
        self.pending.insert(
            id,
            Pending {
                handler,
                on_reply: Box::new(on_reply),
            },
        );
        if let Err(e) = sink.send_message(Request { id, payload }.into()) {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Route a reply. Returns `false` when no one was waiting for it.
    pub fn on_reply(&mut self, reply: RequestReply) -> bool {
        match self.pending.remove(&reply.id) {
            Some(pending) => {
                (pending.on_reply)(reply);
                true
            }
            None => {
                debug!("dropping reply for request {} with no pending handler", reply.id);
                false
            }
        }
    }

    /// Forget every request still pending for `handler`; returns how many.
    pub fn unregister(&mut self, handler: HandlerId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.handler != handler);
        before - self.pending.len()
    }

    /// Forget all pending requests.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use tracedbg_proto::{ContextObjectName, Message, ObjectType};

    use crate::testing::RecordingSink;

    fn query(name: u32) -> RequestPayload {
        RequestPayload::query(ObjectType::Texture, ContextObjectName::new(1, name))
    }

    fn recorder() -> (Rc<RefCell<Vec<RequestReply>>>, impl FnOnce(RequestReply) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |reply| sink.borrow_mut().push(reply))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h = mgr.register_handler();
        let a = mgr.issue(&mut sink, h, query(1), |_| {}).unwrap();
        let b = mgr.issue(&mut sink, h, query(2), |_| {}).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(mgr.pending_count(), 2);
        match &sink.sent[1] {
            Message::Request(req) => assert_eq!(req.id, 2),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn reply_invokes_callback_once() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h = mgr.register_handler();
        let (seen, cb) = recorder();
        let id = mgr.issue(&mut sink, h, query(1), cb).unwrap();

        assert!(mgr.on_reply(RequestReply::success(id, None)));
        assert!(!mgr.on_reply(RequestReply::success(id, None)));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn unregistered_handler_gets_no_callback() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h = mgr.register_handler();
        let (seen, cb) = recorder();
        let id = mgr.issue(&mut sink, h, query(1), cb).unwrap();

        assert_eq!(mgr.unregister(h), 1);
        assert!(!mgr.on_reply(RequestReply::success(id, None)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn out_of_order_replies_reach_their_own_handlers() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h1 = mgr.register_handler();
        let h2 = mgr.register_handler();
        let (seen1, cb1) = recorder();
        let (seen2, cb2) = recorder();
        let id1 = mgr.issue(&mut sink, h1, query(10), cb1).unwrap();
        let id2 = mgr.issue(&mut sink, h2, query(20), cb2).unwrap();

        assert!(mgr.on_reply(RequestReply::failure(id2, "second")));
        assert!(mgr.on_reply(RequestReply::failure(id1, "first")));

        let seen1 = seen1.borrow();
        let seen2 = seen2.borrow();
        assert_eq!(seen1.len(), 1);
        assert_eq!(seen2.len(), 1);
        assert_eq!(seen1[0].id, id1);
        assert_eq!(seen1[0].error_msg.as_deref(), Some("first"));
        assert_eq!(seen2[0].id, id2);
        assert_eq!(seen2[0].error_msg.as_deref(), Some("second"));
    }

    #[test]
    fn unregister_only_purges_that_handler() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h1 = mgr.register_handler();
        let h2 = mgr.register_handler();
        mgr.issue(&mut sink, h1, query(1), |_| {}).unwrap();
        mgr.issue(&mut sink, h1, query(2), |_| {}).unwrap();
        let keep = mgr.issue(&mut sink, h2, query(3), |_| {}).unwrap();

        assert_eq!(mgr.unregister(h1), 2);
        assert_eq!(mgr.pending_count(), 1);
        assert!(mgr.is_pending(keep));
    }

    #[test]
    fn failed_send_leaves_nothing_pending() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let h = mgr.register_handler();
        assert!(mgr.issue(&mut sink, h, query(1), |_| {}).is_err());
        assert_eq!(mgr.pending_count(), 0);

        sink.fail = false;
        // The failed id is burned, never handed out twice.
        assert_eq!(mgr.issue(&mut sink, h, query(1), |_| {}).unwrap(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let mut mgr = RequestManager::new();
        let mut sink = RecordingSink::default();
        let h = mgr.register_handler();
        let (seen, cb) = recorder();
        let id = mgr.issue(&mut sink, h, query(1), cb).unwrap();
        mgr.clear();
        assert!(!mgr.on_reply(RequestReply::success(id, None)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn handler_ids_are_distinct_per_manager() {
        let mut a = RequestManager::new();
        let mut b = RequestManager::new();
        let a1 = a.register_handler();
        let a2 = a.register_handler();
        assert_ne!(a1, a2);
        // Independent managers allocate independently.
        assert_eq!(b.register_handler(), a1);
    }
}
