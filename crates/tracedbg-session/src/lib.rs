//! Controller side of a debug session.
//!
//! [`SessionController`] drives one peer over a [`tracedbg_net::Link`],
//! [`RequestManager`] correlates ad-hoc requests with their replies and
//! [`ResourceManager`] re-queries every watched object whenever the peer
//! pauses.

pub mod breakpoint;
pub mod controller;
pub mod error;
pub mod request;
pub mod resource;

#[cfg(test)]
mod testing;

pub use breakpoint::BreakpointSet;
pub use controller::{BreakInfo, SessionController, SessionEvents, SessionState};
pub use error::SessionError;
pub use request::{HandlerId, ReplyCallback, RequestManager};
pub use resource::{ListenerId, ResourceListener, ResourceManager, EMPTY_REPLY};
