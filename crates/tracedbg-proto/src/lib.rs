//! Wire model of the tracedbg control protocol.
//!
//! Defines the closed message, request and resource taxonomies, their
//! string-tagged binary encoding, the length-prefixed frame codec, and the
//! [`MessageHandler`] dispatch trait both sides of a session implement.

mod tagged;

pub mod codec;
pub mod error;
pub mod handler;
pub mod message;
pub mod request;
pub mod resource;
pub mod types;

pub use codec::{decode_body, decode_frame, decode_header, encode_frame, HEADER_LEN, MAX_FRAME_LEN};
pub use error::ProtoError;
pub use handler::MessageHandler;
pub use message::{
    BreakedCall, CallTrace, ContinueBreak, Hello, Message, QueryCallTrace, Request, RequestId,
    RequestReply, SetBreakPoints, Terminate,
};
pub use request::{EditShaderSource, ForceLinkProgram, QueryResource, RequestPayload};
pub use resource::Resource;
pub use types::{
    AnyValue, BreakConfiguration, CalledEntryPoint, ContextId, ContextObjectName, ContextReport,
    Entrypoint, GlName, ObjectType, StepMode,
};
