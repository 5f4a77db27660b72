//! Framed message transport for tracedbg sessions.
//!
//! One [`Transport`] carries one controller/peer connection over TCP or a
//! local domain socket. The session layer talks to it through the
//! [`MessageSink`] and [`Link`] traits so it can be driven by any event
//! source in tests.

pub mod endpoint;
pub mod error;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::NetError;
pub use transport::{Link, MessageSink, Transport, TransportEvent, TransportHandler};
