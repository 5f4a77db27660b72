//! Debug session state machine.
//!
//! The controller owns one link to a peer and sequences
//! connect / break / step / continue on top of it. It is single-threaded:
//! nothing happens except inside [`SessionController::pump`] or a command
//! method, so the owner decides when callbacks run.

use std::rc::Rc;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use tracedbg_net::{Endpoint, Link, Transport, TransportEvent};
use tracedbg_proto::{
    BreakConfiguration, BreakedCall, CallTrace, CalledEntryPoint, ContextId, ContextObjectName,
    ContextReport, ContinueBreak, Entrypoint, Hello, Message, MessageHandler, ObjectType,
    QueryCallTrace, RequestId, RequestPayload, RequestReply, StepMode, Terminate,
};

use crate::breakpoint::BreakpointSet;
use crate::error::SessionError;
use crate::request::{HandlerId, RequestManager};
use crate::resource::{ListenerId, ResourceListener, ResourceManager};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link.
    Disconnected,
    /// Link requested; waiting for the peer's `Hello`.
    Connecting,
    /// The peer is executing.
    Running,
    /// The peer is paused before a call.
    Breaked,
}

/// What the peer reported when it paused.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakInfo {
    pub entrypoint: CalledEntryPoint,
    pub trace_size: u64,
    pub current_context: ContextId,
    pub context_reports: Vec<ContextReport>,
}

impl From<BreakedCall> for BreakInfo {
    fn from(msg: BreakedCall) -> Self {
        Self {
            entrypoint: msg.entrypoint,
            trace_size: msg.trace_size,
            current_context: msg.current_context,
            context_reports: msg.context_reports,
        }
    }
}

/// Session notifications for the front-end.
pub trait SessionEvents {
    fn on_status(&mut self, _status: &str) {}
    fn on_connected(&mut self, _process_name: &str) {}
    fn on_break(&mut self, _info: &BreakInfo) {}
    fn on_trace_chunk(&mut self, _start: u64, _records: &[CalledEntryPoint]) {}
    /// The link was lost; `reason` is the transport's own error text.
    fn on_disconnect(&mut self, _reason: &str) {}
    fn on_sending_started(&mut self) {}
    fn on_sending_stopped(&mut self) {}
}

/// Drives one debug session.
pub struct SessionController {
    runtime: Handle,
    link: Option<Box<dyn Link>>,
    state: SessionState,
    events: Box<dyn SessionEvents>,
    requests: RequestManager,
    resources: ResourceManager,
    breakpoints: BreakpointSet,
    configuration: BreakConfiguration,
    first_break_synced: bool,
    last_break: Option<BreakInfo>,
    peer_name: Option<String>,
}

impl SessionController {
    /// Create a disconnected session. Transports it opens run on `runtime`.
    pub fn new(runtime: Handle, events: Box<dyn SessionEvents>) -> Self {
        Self {
            runtime,
            link: None,
            state: SessionState::Disconnected,
            events,
            requests: RequestManager::new(),
            resources: ResourceManager::new(),
            breakpoints: BreakpointSet::new(),
            configuration: BreakConfiguration::default(),
            first_break_synced: false,
            last_break: None,
            peer_name: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the peer has said hello.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Breaked)
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn configuration(&self) -> &BreakConfiguration {
        &self.configuration
    }

    pub fn last_break(&self) -> Option<&BreakInfo> {
        self.last_break.as_ref()
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.pending_count()
    }

    // ── connection ──────────────────────────────────────────────────────────

    /// Open a transport to `endpoint`. Any existing link is dropped first.
    pub fn connect(&mut self, endpoint: &Endpoint) {
        let transport = Transport::connect(&self.runtime, endpoint);
        self.events.on_status(&format!("Connecting to {endpoint}..."));
        self.connect_with(Box::new(transport));
    }

    /// Adopt an already created link.
    pub fn connect_with(&mut self, link: Box<dyn Link>) {
        if self.link.is_some() {
            self.disconnect();
        }
        self.link = Some(link);
        self.first_break_synced = false;
        self.transition(SessionState::Connecting);
    }

    /// Tear the link down on request.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.abort();
        }
        self.reset_connection();
        self.events.on_status("Disconnected.");
    }

    /// Handle every completion the link has ready; returns how many.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.link.as_mut().and_then(|link| link.poll_event()) {
            handled += 1;
            self.handle_event(event);
        }
        handled
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                debug!("link established, waiting for hello");
                self.events.on_status("Connected, waiting for peer...");
            }
            TransportEvent::Message(msg) => {
                let tag = msg.tag();
                if let Err(e) = msg.dispatch(self) {
                    warn!("fatal error handling {}: {}", tag, e);
                    self.lose_connection(e.to_string());
                }
            }
            TransportEvent::SendingStarted => self.events.on_sending_started(),
            TransportEvent::SendingStopped => self.events.on_sending_stopped(),
            TransportEvent::Disconnected(reason) => {
                warn!("link lost: {}", reason);
                self.lose_connection(reason);
            }
        }
    }

    fn lose_connection(&mut self, reason: String) {
        match self.link.take() {
            Some(mut link) => link.abort(),
            None => return,
        }
        self.reset_connection();
        self.events.on_disconnect(&reason);
    }

    fn reset_connection(&mut self) {
        self.requests.clear();
        self.first_break_synced = false;
        self.last_break = None;
        self.peer_name = None;
        self.transition(SessionState::Disconnected);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    // ── commands ────────────────────────────────────────────────────────────

    /// Resume a paused peer.
    pub fn continue_(&mut self) -> Result<(), SessionError> {
        self.resume("continue", ContinueBreak::resume())
    }

    /// Resume a paused peer until the next call, draw call, or frame.
    pub fn step(&mut self, mode: StepMode) -> Result<(), SessionError> {
        self.resume("step", ContinueBreak::step(mode))
    }

    fn resume(&mut self, op: &'static str, command: ContinueBreak) -> Result<(), SessionError> {
        self.require_state(op, SessionState::Breaked)?;
        self.send(command.into())?;
        self.transition(SessionState::Running);
        self.events.on_status("Running...");
        Ok(())
    }

    /// Ask a running peer to pause at its next call.
    ///
    /// The state only changes when the resulting break arrives.
    pub fn interrupt(&mut self) -> Result<(), SessionError> {
        self.require_state("interrupt", SessionState::Running)?;
        self.send(ContinueBreak::interrupt().into())?;
        self.events.on_status("Interrupting...");
        Ok(())
    }

    /// Ask the peer to shut its process down.
    pub fn terminate(&mut self) -> Result<(), SessionError> {
        self.require_connected("terminate")?;
        self.send(Terminate.into())
    }

    /// Replace the breakpoint set; sent now if connected, otherwise at the
    /// first break.
    pub fn set_breakpoints<I>(&mut self, entrypoints: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = Entrypoint>,
    {
        self.breakpoints.replace(entrypoints);
        if self.is_connected() {
            let msg = self.breakpoints.to_message();
            self.send(msg.into())?;
        }
        Ok(())
    }

    /// Replace the break configuration; same delivery rule as breakpoints.
    pub fn configure(&mut self, configuration: BreakConfiguration) -> Result<(), SessionError> {
        self.configuration = configuration;
        if self.is_connected() {
            self.send(configuration.into())?;
        }
        Ok(())
    }

    /// Request the history window `[start, end)` counted back from the newest
    /// call. The answer arrives through `on_trace_chunk`.
    pub fn query_trace(&mut self, start: u64, end: u64) -> Result<(), SessionError> {
        self.require_connected("query trace")?;
        if end < start {
            return Err(SessionError::InvalidRange { start, end });
        }
        self.send(QueryCallTrace { start, end }.into())
    }

    pub fn register_handler(&mut self) -> HandlerId {
        self.requests.register_handler()
    }

    /// Drop every request still pending for `handler`.
    pub fn unregister_handler(&mut self, handler: HandlerId) {
        self.requests.unregister(handler);
    }

    /// Send an ad-hoc request; `on_reply` runs when its reply arrives.
    pub fn request<F>(
        &mut self,
        handler: HandlerId,
        payload: RequestPayload,
        on_reply: F,
    ) -> Result<RequestId, SessionError>
    where
        F: FnOnce(RequestReply) + 'static,
    {
        self.require_connected("send request")?;
        let link = self.link.as_deref_mut().ok_or(SessionError::NotConnected)?;
        Ok(self.requests.issue(link, handler, payload, on_reply)?)
    }

    /// Watch an object; it is queried at every pause from now on.
    pub fn subscribe(
        &mut self,
        name: ContextObjectName,
        object_type: ObjectType,
        listener: Rc<dyn ResourceListener>,
    ) -> ListenerId {
        self.resources
            .subscribe(&mut self.requests, name, object_type, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.resources.unsubscribe(&mut self.requests, id)
    }

    // ── internal helpers ────────────────────────────────────────────────────

    fn send(&mut self, msg: Message) -> Result<(), SessionError> {
        let link = self.link.as_mut().ok_or(SessionError::NotConnected)?;
        link.send_message(msg)?;
        Ok(())
    }

    fn require_state(&self, op: &'static str, expected: SessionState) -> Result<(), SessionError> {
        match self.state {
            SessionState::Disconnected => Err(SessionError::NotConnected),
            state if state == expected => Ok(()),
            state => Err(SessionError::InvalidState { op, state }),
        }
    }

    fn require_connected(&self, op: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Running | SessionState::Breaked => Ok(()),
            SessionState::Disconnected => Err(SessionError::NotConnected),
            state => Err(SessionError::InvalidState { op, state }),
        }
    }

    fn sync_first_break(&mut self) -> Result<(), SessionError> {
        if self.first_break_synced {
            return Ok(());
        }
        self.first_break_synced = true;
        info!(
            breakpoints = self.breakpoints.len(),
            "first break, pushing configuration and breakpoints"
        );
        self.send(self.configuration.into())?;
        let breakpoints = self.breakpoints.to_message();
        self.send(breakpoints.into())
    }
}

impl MessageHandler for SessionController {
    type Error = SessionError;

    fn handle_hello(&mut self, msg: Hello) -> Result<(), SessionError> {
        self.require_state("accept hello", SessionState::Connecting)?;
        info!("peer {} attached", msg.process_name);
        self.transition(SessionState::Running);
        self.events.on_connected(&msg.process_name);
        self.events
            .on_status(&format!("Connected to {}.", msg.process_name));
        self.peer_name = Some(msg.process_name);
        Ok(())
    }

    fn handle_breaked_call(&mut self, msg: BreakedCall) -> Result<(), SessionError> {
        self.require_connected("accept break")?;
        self.sync_first_break()?;

        let info = BreakInfo::from(msg);
        debug!(entrypoint = info.entrypoint.entrypoint, trace_size = info.trace_size, "peer paused");
        self.transition(SessionState::Breaked);
        self.events.on_break(&info);
        self.last_break = Some(info);

        let link = self.link.as_deref_mut().ok_or(SessionError::NotConnected)?;
        let queried = self.resources.refresh_all(&mut self.requests, link)?;
        debug!(queried, "refreshed resources");
        self.events.on_status("Breaked execution.");
        Ok(())
    }

    fn handle_call_trace(&mut self, msg: CallTrace) -> Result<(), SessionError> {
        self.require_connected("accept call trace")?;
        self.events.on_trace_chunk(msg.start, &msg.records);
        Ok(())
    }

    fn handle_request_reply(&mut self, msg: RequestReply) -> Result<(), SessionError> {
        self.requests.on_reply(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use tracedbg_proto::resource::BufferResource;
    use tracedbg_proto::{Request, Resource, SetBreakPoints};

    use crate::testing::ScriptedLink;

    #[derive(Default)]
    struct Log {
        statuses: Vec<String>,
        connected: Vec<String>,
        breaks: Vec<BreakInfo>,
        chunks: Vec<(u64, usize)>,
        disconnects: Vec<String>,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl SessionEvents for Recorder {
        fn on_status(&mut self, status: &str) {
            self.0.borrow_mut().statuses.push(status.to_string());
        }
        fn on_connected(&mut self, process_name: &str) {
            self.0.borrow_mut().connected.push(process_name.to_string());
        }
        fn on_break(&mut self, info: &BreakInfo) {
            self.0.borrow_mut().breaks.push(info.clone());
        }
        fn on_trace_chunk(&mut self, start: u64, records: &[CalledEntryPoint]) {
            self.0.borrow_mut().chunks.push((start, records.len()));
        }
        fn on_disconnect(&mut self, reason: &str) {
            self.0.borrow_mut().disconnects.push(reason.to_string());
        }
    }

    struct Fixture {
        _rt: tokio::runtime::Runtime,
        session: SessionController,
        link: ScriptedLink,
        log: Rc<RefCell<Log>>,
    }

    fn fixture() -> Fixture {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let log = Rc::new(RefCell::new(Log::default()));
        let session = SessionController::new(rt.handle().clone(), Box::new(Recorder(log.clone())));
        Fixture {
            _rt: rt,
            session,
            link: ScriptedLink::default(),
            log,
        }
    }

    fn hello() -> Hello {
        Hello {
            process_name: "glxgears".into(),
        }
    }

    fn breaked(entrypoint: Entrypoint) -> BreakedCall {
        BreakedCall {
            entrypoint: CalledEntryPoint::new(entrypoint, vec![]),
            trace_size: 12,
            current_context: 1,
            context_reports: vec![ContextReport::new(1)],
        }
    }

    fn count<F: Fn(&Message) -> bool>(sent: &[Message], pred: F) -> usize {
        sent.iter().filter(|m| pred(m)).count()
    }

    /// connect + hello, ready in `Running`.
    fn attached() -> Fixture {
        let mut f = fixture();
        f.session.connect_with(Box::new(f.link.clone()));
        f.link.push(hello());
        f.session.pump();
        f
    }

    #[test]
    fn hello_moves_connecting_to_running() {
        let mut f = fixture();
        f.session.connect_with(Box::new(f.link.clone()));
        assert_eq!(f.session.state(), SessionState::Connecting);

        f.link.push_event(TransportEvent::Connected);
        f.link.push(hello());
        assert_eq!(f.session.pump(), 2);
        assert_eq!(f.session.state(), SessionState::Running);
        assert_eq!(f.session.peer_name(), Some("glxgears"));
        assert_eq!(f.log.borrow().connected, vec!["glxgears".to_string()]);
    }

    #[test]
    fn first_break_sync_happens_once() {
        let mut f = attached();
        f.session.set_breakpoints([4]).unwrap();
        f.link.take_sent();

        f.link.push(breaked(4));
        f.session.pump();
        f.session.continue_().unwrap();
        f.link.push(breaked(4));
        f.session.pump();

        let sent = f.link.sent();
        assert_eq!(count(&sent, |m| matches!(m, Message::Configuration(_))), 1);
        assert_eq!(count(&sent, |m| matches!(m, Message::SetBreakPoints(_))), 1);
        // Configuration goes out before the breakpoints.
        assert!(matches!(sent[0], Message::Configuration(_)));
        assert!(matches!(sent[1], Message::SetBreakPoints(_)));
        assert_eq!(f.log.borrow().breaks.len(), 2);
    }

    #[test]
    fn breakpoints_set_while_disconnected_are_deferred() {
        let mut f = fixture();
        f.session.set_breakpoints([7, 3]).unwrap();
        f.session
            .configure(BreakConfiguration {
                break_on_error: false,
                ..BreakConfiguration::default()
            })
            .unwrap();

        f.session.connect_with(Box::new(f.link.clone()));
        f.link.push(hello());
        f.session.pump();
        assert!(f.link.sent().is_empty());

        f.link.push(breaked(1));
        f.session.pump();
        let sent = f.link.sent();
        assert_eq!(
            sent[0],
            Message::Configuration(BreakConfiguration {
                break_on_error: false,
                ..BreakConfiguration::default()
            })
        );
        assert_eq!(
            sent[1],
            Message::SetBreakPoints(SetBreakPoints {
                entrypoints: [3, 7].into()
            })
        );
    }

    #[test]
    fn breakpoints_set_while_connected_are_sent_immediately() {
        let mut f = attached();
        f.session.set_breakpoints([9]).unwrap();
        assert_eq!(
            f.link.sent(),
            vec![Message::SetBreakPoints(SetBreakPoints {
                entrypoints: [9].into()
            })]
        );
    }

    #[test]
    fn reconnect_syncs_again() {
        let mut f = attached();
        f.link.push(breaked(1));
        f.session.pump();

        let second = ScriptedLink::default();
        f.session.connect_with(Box::new(second.clone()));
        assert!(f.link.aborted());
        second.push(hello());
        second.push(breaked(1));
        f.session.pump();
        assert_eq!(count(&second.sent(), |m| matches!(m, Message::Configuration(_))), 1);
    }

    #[test]
    fn continue_and_step_need_a_break() {
        let mut f = attached();
        assert!(matches!(
            f.session.continue_(),
            Err(SessionError::InvalidState {
                state: SessionState::Running,
                ..
            })
        ));

        f.link.push(breaked(2));
        f.session.pump();
        assert_eq!(f.session.state(), SessionState::Breaked);
        f.link.take_sent();

        f.session.step(StepMode::DrawCall).unwrap();
        assert_eq!(f.session.state(), SessionState::Running);
        assert_eq!(
            f.link.take_sent(),
            vec![Message::ContinueBreak(ContinueBreak::step(StepMode::DrawCall))]
        );

        f.link.push(breaked(3));
        f.session.pump();
        f.session.continue_().unwrap();
        assert_eq!(
            f.link.take_sent(),
            vec![Message::ContinueBreak(ContinueBreak::resume())]
        );
    }

    #[test]
    fn interrupt_only_while_running_and_keeps_state() {
        let mut f = attached();
        f.session.interrupt().unwrap();
        assert_eq!(f.session.state(), SessionState::Running);
        assert_eq!(
            f.link.take_sent(),
            vec![Message::ContinueBreak(ContinueBreak::interrupt())]
        );

        f.link.push(breaked(2));
        f.session.pump();
        assert!(f.session.interrupt().is_err());
    }

    #[test]
    fn commands_without_link_report_not_connected() {
        let mut f = fixture();
        assert!(matches!(f.session.continue_(), Err(SessionError::NotConnected)));
        assert!(matches!(f.session.interrupt(), Err(SessionError::NotConnected)));
        assert!(matches!(f.session.query_trace(0, 5), Err(SessionError::NotConnected)));
        assert!(matches!(f.session.terminate(), Err(SessionError::NotConnected)));
        assert_eq!(f.session.pump(), 0);
    }

    #[test]
    fn transport_disconnect_is_reported_once() {
        let mut f = attached();
        let h = f.session.register_handler();
        f.session
            .request(h, RequestPayload::query(ObjectType::Gpu, ContextObjectName::new(1, 0)), |_| {})
            .unwrap();
        assert_eq!(f.session.pending_requests(), 1);

        f.link.push_event(TransportEvent::Disconnected("connection reset by peer".into()));
        f.link.push(hello());
        f.session.pump();

        assert_eq!(f.session.state(), SessionState::Disconnected);
        assert_eq!(f.log.borrow().disconnects, vec!["connection reset by peer".to_string()]);
        assert_eq!(f.session.pending_requests(), 0);
        assert!(f.link.aborted());
        assert_eq!(f.session.pump(), 0);
    }

    #[test]
    fn unexpected_message_is_fatal() {
        let mut f = attached();
        f.link.push(Request {
            id: 1,
            payload: RequestPayload::query(ObjectType::Gpu, ContextObjectName::new(1, 0)),
        });
        f.session.pump();
        assert_eq!(f.session.state(), SessionState::Disconnected);
        let log = f.log.borrow();
        assert_eq!(log.disconnects.len(), 1);
        assert!(log.disconnects[0].contains("msg.req"));
    }

    #[test]
    fn break_before_hello_is_fatal() {
        let mut f = fixture();
        f.session.connect_with(Box::new(f.link.clone()));
        f.link.push(breaked(1));
        f.session.pump();
        assert_eq!(f.session.state(), SessionState::Disconnected);
        assert_eq!(f.log.borrow().disconnects.len(), 1);
    }

    #[test]
    fn each_pause_refreshes_every_listener_once() {
        struct Counter(RefCell<usize>);
        impl ResourceListener for Counter {
            fn on_update(&self, _resource: &Resource) {
                *self.0.borrow_mut() += 1;
            }
            fn on_error(&self, _message: &str) {}
        }

        let mut f = attached();
        let counter = Rc::new(Counter(RefCell::new(0)));
        f.session
            .subscribe(ContextObjectName::new(1, 3), ObjectType::Buffer, counter.clone());
        f.session
            .subscribe(ContextObjectName::new(1, 3), ObjectType::Buffer, counter.clone());
        assert!(f.link.sent().is_empty());

        f.link.push(breaked(1));
        f.session.pump();
        let ids: Vec<u64> = f
            .link
            .take_sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Request(r) => Some(r.id),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);

        for id in ids {
            f.link.push(RequestReply::success(
                id,
                Some(BufferResource { data: vec![1] }.into()),
            ));
        }
        f.session.pump();
        assert_eq!(*counter.0.borrow(), 2);
    }

    #[test]
    fn query_trace_sends_window_and_reports_chunk() {
        let mut f = attached();
        f.session.query_trace(0, 3).unwrap();
        assert_eq!(
            f.link.take_sent(),
            vec![Message::QueryCallTrace(QueryCallTrace { start: 0, end: 3 })]
        );
        assert!(matches!(
            f.session.query_trace(5, 2),
            Err(SessionError::InvalidRange { start: 5, end: 2 })
        ));

        f.link.push(CallTrace {
            start: 0,
            records: vec![CalledEntryPoint::new(1, vec![]); 3],
        });
        f.session.pump();
        assert_eq!(f.log.borrow().chunks, vec![(0, 3)]);
    }

    #[test]
    fn user_disconnect_reports_status_not_error() {
        let mut f = attached();
        f.session.disconnect();
        assert_eq!(f.session.state(), SessionState::Disconnected);
        assert!(f.link.aborted());
        let log = f.log.borrow();
        assert!(log.disconnects.is_empty());
        assert_eq!(log.statuses.last().map(String::as_str), Some("Disconnected."));
    }

    #[test]
    fn unsubscribed_listener_misses_reply() {
        struct Flag(RefCell<bool>);
        impl ResourceListener for Flag {
            fn on_update(&self, _resource: &Resource) {
                *self.0.borrow_mut() = true;
            }
            fn on_error(&self, _message: &str) {
                *self.0.borrow_mut() = true;
            }
        }

        let mut f = attached();
        let flag = Rc::new(Flag(RefCell::new(false)));
        let id = f
            .session
            .subscribe(ContextObjectName::new(1, 3), ObjectType::Buffer, flag.clone());
        f.link.push(breaked(1));
        f.session.pump();
        let request = f
            .link
            .take_sent()
            .into_iter()
            .find_map(|m| match m {
                Message::Request(r) => Some(r.id),
                _ => None,
            })
            .unwrap();

        assert!(f.session.unsubscribe(id));
        f.link.push(RequestReply::failure(request, "gone"));
        f.session.pump();
        assert!(!*flag.0.borrow());
    }
}
