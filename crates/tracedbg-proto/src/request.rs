//! Payloads carried inside [`Request`](crate::message::Request).

use serde::{Deserialize, Serialize};

use crate::tagged::tagged_union;
use crate::types::{ContextId, ContextObjectName, GlName, ObjectType};

/// Snapshot one live object into a [`Resource`](crate::resource::Resource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResource {
    pub object_type: ObjectType,
    pub name: ContextObjectName,
}

/// Replace a shader's source and recompile, or restore the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditShaderSource {
    pub context: ContextId,
    pub shader_id: GlName,
    /// Restore the source the application supplied.
    pub reset: bool,
    /// New source; `None` exactly when `reset` is set.
    pub source: Option<String>,
}

impl EditShaderSource {
    pub fn replace(context: ContextId, shader_id: GlName, source: impl Into<String>) -> Self {
        Self {
            context,
            shader_id,
            reset: false,
            source: Some(source.into()),
        }
    }

    pub fn reset(context: ContextId, shader_id: GlName) -> Self {
        Self {
            context,
            shader_id,
            reset: true,
            source: None,
        }
    }
}

/// Relink a program with its currently attached shaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceLinkProgram {
    pub context: ContextId,
    pub program_id: GlName,
}

tagged_union! {
    /// Everything a controller can ask the peer to do on its behalf.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RequestPayload {
        QueryResource(QueryResource) = "req.query",
        EditShaderSource(EditShaderSource) = "req.edit_shader",
        ForceLinkProgram(ForceLinkProgram) = "req.link_program",
    }
}

impl RequestPayload {
    pub fn query(object_type: ObjectType, name: ContextObjectName) -> Self {
        RequestPayload::QueryResource(QueryResource { object_type, name })
    }
}
