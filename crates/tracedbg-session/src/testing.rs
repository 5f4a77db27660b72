//! In-memory sinks and links for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracedbg_net::{Link, MessageSink, NetError, TransportEvent};
use tracedbg_proto::Message;

/// Collects everything sent through it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub sent: Vec<Message>,
    pub fail: bool,
}

impl MessageSink for RecordingSink {
    fn send_message(&mut self, msg: Message) -> Result<(), NetError> {
        if self.fail {
            return Err(NetError::Closed);
        }
        self.sent.push(msg);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct LinkState {
    pub sent: Vec<Message>,
    pub inbound: VecDeque<TransportEvent>,
    pub aborted: bool,
}

/// A link whose inbound side is scripted by the test.
#[derive(Clone, Default)]
pub(crate) struct ScriptedLink(pub Rc<RefCell<LinkState>>);

impl ScriptedLink {
    pub fn push(&self, msg: impl Into<Message>) {
        self.push_event(TransportEvent::Message(msg.into()));
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.0.borrow_mut().inbound.push_back(event);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.0.borrow().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut self.0.borrow_mut().sent)
    }

    pub fn aborted(&self) -> bool {
        self.0.borrow().aborted
    }
}

impl MessageSink for ScriptedLink {
    fn send_message(&mut self, msg: Message) -> Result<(), NetError> {
        let mut state = self.0.borrow_mut();
        if state.aborted {
            return Err(NetError::Closed);
        }
        state.sent.push(msg);
        Ok(())
    }
}

impl Link for ScriptedLink {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut state = self.0.borrow_mut();
        if state.aborted {
            return None;
        }
        state.inbound.pop_front()
    }

    fn abort(&mut self) {
        let mut state = self.0.borrow_mut();
        state.aborted = true;
        state.inbound.clear();
    }
}
