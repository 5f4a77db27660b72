//! Seam to the call-capture layer that owns the real graphics objects.

use tracedbg_proto::{
    ContextId, ContextObjectName, ContextReport, EditShaderSource, Entrypoint, ForceLinkProgram,
    GlName, ObjectType, QueryResource, Request, RequestPayload, RequestReply, Resource,
};

/// What the peer needs to know about the traced process.
///
/// Errors are plain text; they travel back to the controller verbatim in a
/// failed [`RequestReply`].
pub trait ObjectInspector: Send {
    fn process_name(&self) -> String;

    /// Context current on the calling thread, `0` if none.
    fn current_context(&self) -> ContextId;

    fn context_reports(&self) -> Vec<ContextReport>;

    fn query_resource(
        &mut self,
        object_type: ObjectType,
        name: ContextObjectName,
    ) -> Result<Resource, String>;

    /// Replace a shader's source, or restore the original with `reset`.
    fn edit_shader_source(&mut self, edit: &EditShaderSource) -> Result<(), String>;

    fn force_link_program(&mut self, context: ContextId, program: GlName) -> Result<(), String>;

    fn is_draw_call(&self, entrypoint: Entrypoint) -> bool;

    fn is_frame_delimiter(&self, entrypoint: Entrypoint) -> bool;
}

/// Run one controller request against `inspector` and build its reply.
pub fn answer<I: ObjectInspector + ?Sized>(inspector: &mut I, request: Request) -> RequestReply {
    let id = request.id;
    let outcome = match request.payload {
        RequestPayload::QueryResource(QueryResource { object_type, name }) => {
            inspector.query_resource(object_type, name).map(Some)
        }
        RequestPayload::EditShaderSource(edit) => inspector.edit_shader_source(&edit).map(|()| None),
        RequestPayload::ForceLinkProgram(ForceLinkProgram {
            context,
            program_id,
        }) => inspector.force_link_program(context, program_id).map(|()| None),
    };
    match outcome {
        Ok(payload) => RequestReply::success(id, payload),
        Err(message) => RequestReply::failure(id, message),
    }
}
