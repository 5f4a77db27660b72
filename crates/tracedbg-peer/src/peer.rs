//! The controlled side of a debug session.
//!
//! A traced process calls [`DebugPeer::before_call`] and
//! [`DebugPeer::after_call`] around every intercepted call. Both serialize
//! on one lock, so the transport sees at most one reader and one writer even
//! when calls come in from many application threads.

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use tracedbg_net::{Endpoint, Transport, TransportHandler};
use tracedbg_proto::{
    AnyValue, BreakConfiguration, BreakedCall, CalledEntryPoint, ContinueBreak, Hello, Message,
    MessageHandler, ProtoError, QueryCallTrace, Request, SetBreakPoints, Terminate,
};

use crate::break_state::{BreakState, CallKind};
use crate::error::PeerError;
use crate::history::CallHistory;
use crate::inspector::{answer, ObjectInspector};

/// Debug server embedded in a traced process.
pub struct DebugPeer<I> {
    inner: Mutex<Inner<I>>,
}

struct Inner<I> {
    transport: Transport,
    state: PeerState<I>,
}

struct PeerState<I> {
    inspector: I,
    history: CallHistory,
    breaks: BreakState,
    outbox: Vec<Message>,
    connected: bool,
    terminate: bool,
    lost: Option<String>,
}

impl<I: ObjectInspector> DebugPeer<I> {
    /// Bind `endpoint` and wait for one controller in the background.
    pub fn listen(
        handle: &Handle,
        endpoint: &Endpoint,
        inspector: I,
        history_len: usize,
    ) -> Result<Self, PeerError> {
        let transport = Transport::listen(handle, endpoint)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                transport,
                state: PeerState {
                    inspector,
                    history: CallHistory::new(history_len),
                    breaks: BreakState::new(),
                    outbox: Vec::new(),
                    connected: false,
                    terminate: false,
                    lost: None,
                },
            }),
        })
    }

    /// The address actually bound, which matters for port `0`.
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.inner.lock().transport.local_endpoint().cloned()
    }

    /// Block until a controller connects, then introduce this process.
    pub fn wait_for_controller(&self) -> Result<(), PeerError> {
        let mut inner = self.inner.lock();
        while !inner.state.connected {
            inner.check()?;
            inner.block()?;
        }
        inner.check()?;
        let process_name = inner.state.inspector.process_name();
        info!("controller attached, announcing {}", process_name);
        inner.transport.send(Hello { process_name }.into())?;
        Ok(())
    }

    /// Hook run before `call` executes; blocks for as long as the
    /// controller keeps the process paused.
    pub fn before_call(&self, call: &CalledEntryPoint) -> Result<(), PeerError> {
        let mut inner = self.inner.lock();
        inner.pump()?;
        inner.check()?;

        if inner.state.breaks.may_break_at(call.entrypoint) {
            let state = &inner.state;
            let msg = BreakedCall {
                entrypoint: call.clone(),
                trace_size: state.history.len() as u64,
                current_context: state.inspector.current_context(),
                context_reports: state.inspector.context_reports(),
            };
            inner.transport.send(msg.into())?;
        }

        while inner.state.breaks.is_paused() {
            inner.block()?;
            inner.check()?;
        }

        inner.state.history.add(call.clone());
        Ok(())
    }

    /// Hook run after the call returned.
    ///
    /// `error` is the call's error code, `0` for none.
    pub fn after_call(
        &self,
        ret: Option<AnyValue>,
        error: u32,
        debug_output: Option<String>,
    ) -> Result<(), PeerError> {
        let mut inner = self.inner.lock();
        let state = &mut inner.state;
        if let Some(value) = ret {
            state.history.set_ret_val(value);
        }
        if error != 0 {
            state.history.set_error(error);
            state.breaks.set_break_on_error();
        }
        if let Some(output) = debug_output {
            state.history.set_debug_output(output);
            state.breaks.set_break_on_debug_output();
        }
        if let Some(last) = state.history.last().map(|call| call.entrypoint) {
            let kind = CallKind {
                draw: state.inspector.is_draw_call(last),
                frame_delimiter: state.inspector.is_frame_delimiter(last),
            };
            state.breaks.after_call(kind);
        }
        inner.check()
    }

    /// A shader compile or program link just failed.
    pub fn report_compiler_error(&self) {
        self.inner.lock().state.breaks.set_break_on_compiler_error();
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().state.history.len()
    }
}

impl<I: ObjectInspector> Inner<I> {
    /// Handle whatever the controller has sent so far.
    fn pump(&mut self) -> Result<(), PeerError> {
        self.transport.pump(&mut self.state);
        self.flush()
    }

    /// Wait for at least one transport completion.
    fn block(&mut self) -> Result<(), PeerError> {
        self.transport.run_one(&mut self.state)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), PeerError> {
        if self.state.lost.is_some() {
            self.state.outbox.clear();
            return Ok(());
        }
        for msg in self.state.outbox.drain(..) {
            self.transport.send(msg)?;
        }
        Ok(())
    }

    fn check(&mut self) -> Result<(), PeerError> {
        if let Some(reason) = &self.state.lost {
            self.transport.abort();
            return Err(PeerError::Disconnected(reason.clone()));
        }
        if self.state.terminate {
            return Err(PeerError::TerminateRequested);
        }
        Ok(())
    }
}

impl<I: ObjectInspector> TransportHandler for PeerState<I> {
    fn on_connected(&mut self) {
        self.connected = true;
    }

    fn on_message(&mut self, msg: Message) {
        if self.lost.is_some() {
            return;
        }
        let tag = msg.tag();
        if let Err(e) = msg.dispatch(self) {
            warn!("rejecting {} from controller: {}", tag, e);
            self.lost = Some(e.to_string());
        }
    }

    fn on_disconnected(&mut self, reason: String) {
        warn!("controller link lost: {}", reason);
        self.lost.get_or_insert(reason);
    }
}

impl<I: ObjectInspector> MessageHandler for PeerState<I> {
    type Error = ProtoError;

    fn handle_configuration(&mut self, msg: BreakConfiguration) -> Result<(), ProtoError> {
        debug!(?msg, "break configuration");
        self.breaks.set_configuration(msg);
        Ok(())
    }

    fn handle_continue_break(&mut self, msg: ContinueBreak) -> Result<(), ProtoError> {
        self.breaks.handle_continue(&msg);
        Ok(())
    }

    fn handle_terminate(&mut self, _msg: Terminate) -> Result<(), ProtoError> {
        info!("controller requested termination");
        self.terminate = true;
        Ok(())
    }

    fn handle_query_call_trace(&mut self, msg: QueryCallTrace) -> Result<(), ProtoError> {
        let trace = self.history.query(msg.start, msg.end);
        self.outbox.push(trace.into());
        Ok(())
    }

    fn handle_request(&mut self, msg: Request) -> Result<(), ProtoError> {
        let reply = answer(&mut self.inspector, msg);
        self.outbox.push(reply.into());
        Ok(())
    }

    fn handle_set_break_points(&mut self, msg: SetBreakPoints) -> Result<(), ProtoError> {
        debug!(count = msg.entrypoints.len(), "breakpoints");
        self.breaks.set_breakpoints(msg.entrypoints);
        Ok(())
    }
}
