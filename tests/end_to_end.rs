//! Controller and peer talking over a real loopback socket.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tracedbg_net::Endpoint;
use tracedbg_peer::{DebugPeer, ObjectInspector, PeerError};
use tracedbg_proto::resource::{BufferResource, GpuResource};
use tracedbg_proto::{
    CalledEntryPoint, ContextId, ContextObjectName, ContextReport, EditShaderSource, Entrypoint,
    GlName, ObjectType, RequestPayload, Resource, StepMode,
};
use tracedbg_session::{BreakInfo, ResourceListener, SessionController, SessionEvents, SessionState};

const DRAW: Entrypoint = 4;
const SWAP: Entrypoint = 6;
const FRAME: [Entrypoint; 6] = [1, 2, 3, DRAW, 5, SWAP];

struct TestInspector;

impl ObjectInspector for TestInspector {
    fn process_name(&self) -> String {
        "loopback".into()
    }
    fn current_context(&self) -> ContextId {
        7
    }
    fn context_reports(&self) -> Vec<ContextReport> {
        let mut report = ContextReport::new(7);
        report.buffer_space.insert(ContextObjectName::new(7, 1));
        vec![report]
    }
    fn query_resource(
        &mut self,
        object_type: ObjectType,
        name: ContextObjectName,
    ) -> Result<Resource, String> {
        match (object_type, name.name) {
            (ObjectType::Buffer, 1) => Ok(BufferResource { data: vec![1, 2, 3] }.into()),
            (ObjectType::Gpu, _) => Ok(GpuResource {
                renderer: "loopback".into(),
                version: "1.0".into(),
                vendor: "test".into(),
                shading_language_version: "1.10".into(),
                memory: None,
            }
            .into()),
            (kind, id) => Err(format!("no {kind} {id}")),
        }
    }
    fn edit_shader_source(&mut self, _edit: &EditShaderSource) -> Result<(), String> {
        Err("no shaders".into())
    }
    fn force_link_program(&mut self, _context: ContextId, _program: GlName) -> Result<(), String> {
        Err("no programs".into())
    }
    fn is_draw_call(&self, entrypoint: Entrypoint) -> bool {
        entrypoint == DRAW
    }
    fn is_frame_delimiter(&self, entrypoint: Entrypoint) -> bool {
        entrypoint == SWAP
    }
}

#[derive(Default)]
struct Log {
    connected: Vec<String>,
    breaks: Vec<BreakInfo>,
    traces: Vec<(u64, Vec<Entrypoint>)>,
    disconnects: Vec<String>,
}

struct Recorder(Rc<RefCell<Log>>);

impl SessionEvents for Recorder {
    fn on_connected(&mut self, process_name: &str) {
        self.0.borrow_mut().connected.push(process_name.to_string());
    }
    fn on_break(&mut self, info: &BreakInfo) {
        self.0.borrow_mut().breaks.push(info.clone());
    }
    fn on_trace_chunk(&mut self, start: u64, records: &[CalledEntryPoint]) {
        let eps = records.iter().map(|r| r.entrypoint).collect();
        self.0.borrow_mut().traces.push((start, eps));
    }
    fn on_disconnect(&mut self, reason: &str) {
        self.0.borrow_mut().disconnects.push(reason.to_string());
    }
}

#[derive(Default)]
struct Watch {
    updates: RefCell<Vec<Resource>>,
}

impl ResourceListener for Watch {
    fn on_update(&self, resource: &Resource) {
        self.updates.borrow_mut().push(resource.clone());
    }
    fn on_error(&self, message: &str) {
        panic!("unexpected resource error: {message}");
    }
}

struct Harness {
    session: SessionController,
    log: Rc<RefCell<Log>>,
    peer: Option<thread::JoinHandle<Result<(), PeerError>>>,
}

impl Harness {
    /// Start a peer that runs `frames` frames on its own thread.
    fn start(runtime: &tokio::runtime::Runtime, frames: usize) -> (Self, Endpoint) {
        let peer = DebugPeer::listen(
            runtime.handle(),
            &Endpoint::tcp("127.0.0.1", 0),
            TestInspector,
            64,
        )
        .unwrap();
        let endpoint = peer.local_endpoint().unwrap();
        let worker = thread::spawn(move || {
            peer.wait_for_controller()?;
            for _ in 0..frames {
                for ep in FRAME {
                    peer.before_call(&CalledEntryPoint::new(ep, vec![]))?;
                    peer.after_call(None, 0, None)?;
                }
            }
            Ok(())
        });

        let log = Rc::new(RefCell::new(Log::default()));
        let session = SessionController::new(
            runtime.handle().clone(),
            Box::new(Recorder(log.clone())),
        );
        (
            Self {
                session,
                log,
                peer: Some(worker),
            },
            endpoint,
        )
    }

    fn pump_until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(self) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            if self.session.pump() == 0 {
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    fn wait_for_break(&mut self, count: usize) -> BreakInfo {
        self.pump_until("a break", |h| h.log.borrow().breaks.len() >= count);
        self.log.borrow().breaks[count - 1].clone()
    }

    fn join_peer(&mut self) -> Result<(), PeerError> {
        self.peer.take().unwrap().join().unwrap()
    }
}

#[test]
fn first_break_pushes_breakpoints_and_continue_stops_there() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (mut h, endpoint) = Harness::start(&runtime, 2);

    h.session.set_breakpoints([DRAW]).unwrap();
    h.session.connect(&endpoint);
    h.pump_until("hello", |h| !h.log.borrow().connected.is_empty());
    assert_eq!(h.log.borrow().connected, vec!["loopback".to_string()]);
    assert_eq!(h.session.peer_name(), Some("loopback"));

    let first = h.wait_for_break(1);
    assert_eq!(first.entrypoint.entrypoint, 1);
    assert_eq!(first.trace_size, 0);
    assert_eq!(first.current_context, 7);
    assert_eq!(h.session.state(), SessionState::Breaked);

    // The breakpoints only reach the peer through the first-break sync.
    h.session.continue_().unwrap();
    let second = h.wait_for_break(2);
    assert_eq!(second.entrypoint.entrypoint, DRAW);
    assert_eq!(second.trace_size, 3);

    h.session.continue_().unwrap();
    let third = h.wait_for_break(3);
    assert_eq!(third.entrypoint.entrypoint, DRAW);
    assert_eq!(third.trace_size, 9);

    h.session.set_breakpoints(Vec::new()).unwrap();
    h.session.continue_().unwrap();
    assert!(h.join_peer().is_ok());
}

#[test]
fn trace_query_is_repeatable_while_paused() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (mut h, endpoint) = Harness::start(&runtime, 1);

    h.session.connect(&endpoint);
    h.wait_for_break(1);
    h.session.step(StepMode::DrawCall).unwrap();
    let paused = h.wait_for_break(2);
    assert_eq!(paused.entrypoint.entrypoint, 5);

    h.session.query_trace(0, 3).unwrap();
    h.session.query_trace(0, 3).unwrap();
    h.session.query_trace(0, 100).unwrap();
    h.pump_until("three traces", |h| h.log.borrow().traces.len() == 3);

    let traces = h.log.borrow().traces.clone();
    assert_eq!(traces[0], traces[1]);
    assert_eq!(traces[0].1, vec![2, 3, DRAW]);
    assert_eq!(traces[2].1, vec![1, 2, 3, DRAW]);

    h.session.terminate().unwrap();
    assert!(matches!(h.join_peer(), Err(PeerError::TerminateRequested)));

    // The peer dropped its socket on the way out.
    h.pump_until("the disconnect", |h| !h.log.borrow().disconnects.is_empty());
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(h.session.last_break().is_none());
    assert!(h.session.continue_().is_err());
}

#[test]
fn subscriptions_and_requests_are_answered_at_a_break() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (mut h, endpoint) = Harness::start(&runtime, 1);

    let watch = Rc::new(Watch::default());
    h.session
        .subscribe(ContextObjectName::new(7, 1), ObjectType::Buffer, watch.clone());

    h.session.connect(&endpoint);
    h.wait_for_break(1);
    h.pump_until("the watched buffer", |_| !watch.updates.borrow().is_empty());
    assert_eq!(
        watch.updates.borrow()[0],
        Resource::from(BufferResource { data: vec![1, 2, 3] })
    );

    let reply = Rc::new(RefCell::new(None));
    let slot = reply.clone();
    let handler = h.session.register_handler();
    h.session
        .request(
            handler,
            RequestPayload::query(ObjectType::Texture, ContextObjectName::new(7, 9)),
            move |r| *slot.borrow_mut() = Some(r.into_result()),
        )
        .unwrap();
    h.pump_until("the texture reply", |_| reply.borrow().is_some());
    let result = reply.borrow_mut().take().unwrap();
    assert!(result.unwrap_err().contains("no texture 9"));
    assert_eq!(h.session.pending_requests(), 0);

    h.session.terminate().unwrap();
    assert!(matches!(h.join_peer(), Err(PeerError::TerminateRequested)));
}
