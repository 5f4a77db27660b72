//! Session error types.

use thiserror::Error;
use tracedbg_net::NetError;
use tracedbg_proto::ProtoError;

use crate::controller::SessionState;

/// Errors from session commands and inbound message handling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command needs a connected peer.
    #[error("not connected")]
    NotConnected,

    /// The command (or an inbound message) is not legal in the current state.
    #[error("cannot {op}: session is in {state:?} state")]
    InvalidState {
        /// What was attempted.
        op: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// A trace window whose end precedes its start.
    #[error("invalid trace window {start}..{end}")]
    InvalidRange {
        /// First offset.
        start: u64,
        /// One past the last offset.
        end: u64,
    },

    /// The transport refused the message.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The peer sent something this side cannot accept.
    #[error(transparent)]
    Protocol(#[from] ProtoError),
}
