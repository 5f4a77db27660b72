//! The closed set of messages exchanged between controller and peer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::request::RequestPayload;
use crate::resource::Resource;
use crate::tagged::tagged_union;
use crate::types::{BreakConfiguration, CalledEntryPoint, ContextId, ContextReport, Entrypoint, StepMode};

/// Correlation key of a request and its reply.
pub type RequestId = u64;

/// First message a peer sends once a controller is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub process_name: String,
}

/// The peer paused before executing `entrypoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakedCall {
    pub entrypoint: CalledEntryPoint,
    /// Number of calls in the peer's history.
    pub trace_size: u64,
    pub current_context: ContextId,
    pub context_reports: Vec<ContextReport>,
}

/// Resume, step, or pause the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueBreak {
    pub interrupt: bool,
    pub step_mode: Option<StepMode>,
}

impl ContinueBreak {
    pub fn resume() -> Self {
        Self {
            interrupt: false,
            step_mode: None,
        }
    }

    pub fn step(mode: StepMode) -> Self {
        Self {
            interrupt: false,
            step_mode: Some(mode),
        }
    }

    /// Ask a running peer to pause at its next call.
    pub fn interrupt() -> Self {
        Self {
            interrupt: true,
            step_mode: None,
        }
    }
}

/// Ask the peer to shut its process down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminate;

/// Ask for the history window `[start, end)`, counted back from the newest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCallTrace {
    pub start: u64,
    pub end: u64,
}

/// Answer to [`QueryCallTrace`]; `records` are oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTrace {
    pub start: u64,
    pub records: Vec<CalledEntryPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestReply {
    pub id: RequestId,
    pub ok: bool,
    pub error_msg: Option<String>,
    pub payload: Option<Resource>,
}

impl RequestReply {
    pub fn success(id: RequestId, payload: Option<Resource>) -> Self {
        Self {
            id,
            ok: true,
            error_msg: None,
            payload,
        }
    }

    pub fn failure(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            error_msg: Some(message.into()),
            payload: None,
        }
    }

    /// Split into the peer's result: the optional resource, or its error text.
    pub fn into_result(self) -> Result<Option<Resource>, String> {
        if self.ok {
            Ok(self.payload)
        } else {
            Err(self.error_msg.unwrap_or_default())
        }
    }
}

/// Replace the peer's breakpoint set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBreakPoints {
    pub entrypoints: BTreeSet<Entrypoint>,
}

tagged_union! {
    /// One frame's worth of protocol traffic.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Message {
        Hello(Hello) = "msg.hello",
        Configuration(BreakConfiguration) = "msg.cfg",
        BreakedCall(BreakedCall) = "msg.break",
        ContinueBreak(ContinueBreak) = "msg.cont",
        Terminate(Terminate) = "msg.term",
        QueryCallTrace(QueryCallTrace) = "msg.qtrace",
        CallTrace(CallTrace) = "msg.trace",
        Request(Request) = "msg.req",
        RequestReply(RequestReply) = "msg.reply",
        SetBreakPoints(SetBreakPoints) = "msg.bkpt",
    }
}
