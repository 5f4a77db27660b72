//! Peer error types.

use thiserror::Error;
use tracedbg_net::NetError;
use tracedbg_proto::ProtoError;

/// Errors surfaced to the traced process by the call hooks.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Protocol(#[from] ProtoError),

    /// The controller went away; the process should not keep running
    /// uncontrolled.
    #[error("controller disconnected: {0}")]
    Disconnected(String),

    /// The controller asked the process to exit.
    #[error("termination requested by controller")]
    TerminateRequested,
}
