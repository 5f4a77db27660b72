//! Transport error types.

use thiserror::Error;
use tracedbg_proto::ProtoError;

/// Errors from transport setup and sending.
#[derive(Debug, Error)]
pub enum NetError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The transport was aborted or has disconnected.
    #[error("transport is closed")]
    Closed,

    /// Local domain sockets were requested on a platform without them.
    #[error("local domain sockets are not supported on this platform")]
    Unsupported,
}
