//! Peer side of a debug session, embedded in the traced process.
//!
//! [`DebugPeer`] accepts one controller, reports every pause and answers
//! trace and resource queries. The capture layer plugs in through
//! [`ObjectInspector`].

pub mod break_state;
pub mod error;
pub mod history;
pub mod inspector;
pub mod peer;

pub use break_state::{BreakState, CallKind};
pub use error::PeerError;
pub use history::CallHistory;
pub use inspector::{answer, ObjectInspector};
pub use peer::DebugPeer;
