//! A synthetic traced process for trying the controller without a real
//! graphics application.
//!
//! It replays a fixed per-frame call script through a [`DebugPeer`] and
//! answers resource queries from a small fabricated object table.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use tracedbg_config::Config;
use tracedbg_net::Endpoint;
use tracedbg_peer::{DebugPeer, ObjectInspector, PeerError};
use tracedbg_proto::resource::{
    BufferResource, GpuResource, PixelRectangle, ProgramResource, ShaderResource, StateItem,
    StateResource, TextureResource, Uniform,
};
use tracedbg_proto::{
    AnyValue, CalledEntryPoint, ContextId, ContextObjectName, ContextReport, EditShaderSource,
    Entrypoint, GlName, ObjectType, Resource,
};

pub const CLEAR: Entrypoint = 1;
pub const USE_PROGRAM: Entrypoint = 2;
pub const BIND_BUFFER: Entrypoint = 3;
pub const DRAW_ARRAYS: Entrypoint = 4;
pub const GET_ERROR: Entrypoint = 5;
pub const SWAP_BUFFERS: Entrypoint = 6;
pub const LINK_PROGRAM: Entrypoint = 7;
pub const ATTACH_SHADER: Entrypoint = 8;

const CONTEXT: ContextId = 1;
const PROGRAM: GlName = 3;
const VERTEX_SHADER: GlName = 1;
const FRAGMENT_SHADER: GlName = 2;
const VERTEX_BUFFER: GlName = 1;
const TEXTURE: GlName = 1;

const GL_VERTEX_SHADER: u32 = 0x8B31;
const GL_FRAGMENT_SHADER: u32 = 0x8B30;
const GL_RGBA: u32 = 0x1908;
const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_FLOAT: u32 = 0x1406;
const GL_ARRAY_BUFFER: u32 = 0x8892;
const GL_TRIANGLES: u32 = 0x0004;

/// The calls issued once before the first frame. The first link comes
/// before the fragment shader is attached and fails.
pub fn setup_script() -> Vec<CalledEntryPoint> {
    let attach = |shader| {
        CalledEntryPoint::new(ATTACH_SHADER, vec![AnyValue::U32(PROGRAM), AnyValue::U32(shader)])
    };
    let link = || CalledEntryPoint::new(LINK_PROGRAM, vec![AnyValue::U32(PROGRAM)]);
    vec![attach(VERTEX_SHADER), link(), attach(FRAGMENT_SHADER), link()]
}

/// Tracks shader attachment across replayed calls to decide link outcomes.
#[derive(Debug, Default)]
struct Linker {
    attached: BTreeSet<GlName>,
}

impl Linker {
    /// Apply `call`. Returns `false` for a link that fails.
    fn apply(&mut self, call: &CalledEntryPoint) -> bool {
        match (call.entrypoint, call.args.as_slice()) {
            (ATTACH_SHADER, [_, AnyValue::U32(shader)]) => {
                self.attached.insert(*shader);
                true
            }
            (LINK_PROGRAM, _) => [VERTEX_SHADER, FRAGMENT_SHADER]
                .iter()
                .all(|shader| self.attached.contains(shader)),
            _ => true,
        }
    }
}

/// The calls issued by one frame.
pub fn frame_script() -> Vec<CalledEntryPoint> {
    vec![
        CalledEntryPoint::new(CLEAR, vec![AnyValue::Enum(0x4000)]),
        CalledEntryPoint::new(USE_PROGRAM, vec![AnyValue::U32(PROGRAM)]),
        CalledEntryPoint::new(
            BIND_BUFFER,
            vec![AnyValue::Enum(GL_ARRAY_BUFFER), AnyValue::U32(VERTEX_BUFFER)],
        ),
        CalledEntryPoint::new(
            DRAW_ARRAYS,
            vec![AnyValue::Enum(GL_TRIANGLES), AnyValue::I32(0), AnyValue::I32(3)],
        ),
        CalledEntryPoint::new(GET_ERROR, vec![]),
        CalledEntryPoint::new(SWAP_BUFFERS, vec![]),
    ]
}

struct Shader {
    original: String,
    source: String,
}

/// Fabricated object table for one context.
pub struct SyntheticInspector {
    shaders: BTreeMap<GlName, Shader>,
    linked: bool,
}

impl Default for SyntheticInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticInspector {
    pub fn new() -> Self {
        let mut shaders = BTreeMap::new();
        for (id, source) in [
            (
                VERTEX_SHADER,
                "attribute vec2 pos;\nvoid main() {\n    gl_Position = vec4(pos, 0.0, 1.0);\n}\n",
            ),
            (
                FRAGMENT_SHADER,
                "uniform vec4 tint;\nvoid main() {\n    gl_FragColor = tint;\n}\n",
            ),
        ] {
            shaders.insert(
                id,
                Shader {
                    original: source.to_string(),
                    source: source.to_string(),
                },
            );
        }
        Self {
            shaders,
            linked: true,
        }
    }

    fn texture(&self) -> Result<Resource, String> {
        let mut levels = Vec::new();
        let mut size = 4u32;
        while size > 0 {
            let storage = [0x40u8, 0x80, 0xc0, 0xff].repeat((size * size) as usize);
            let rect = PixelRectangle::new(
                size,
                size,
                size * 4,
                GL_RGBA,
                GL_UNSIGNED_BYTE,
                GL_RGBA,
                storage,
            )
            .map_err(|e| e.to_string())?;
            levels.push(rect);
            size /= 2;
        }
        Ok(TextureResource {
            faces: vec![levels],
        }
        .into())
    }

    fn buffer(&self) -> Resource {
        let data = [-0.5f32, -0.5, 0.5, -0.5, 0.0, 0.5]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        BufferResource { data }.into()
    }

    fn shader(&self, id: GlName) -> Result<Resource, String> {
        let shader = self
            .shaders
            .get(&id)
            .ok_or_else(|| format!("no shader {id} in context {CONTEXT:#x}"))?;
        Ok(ShaderResource {
            source: shader.source.clone(),
            deleted: false,
            compile_ok: true,
            compile_status: String::new(),
        }
        .into())
    }

    fn program(&self) -> Resource {
        ProgramResource {
            link_ok: self.linked,
            link_status: if self.linked {
                String::new()
            } else {
                "shaders changed since last link".to_string()
            },
            attached_shaders: vec![
                (VERTEX_SHADER, GL_VERTEX_SHADER),
                (FRAGMENT_SHADER, GL_FRAGMENT_SHADER),
            ],
            uniforms: vec![Uniform {
                name: "tint".to_string(),
                location: 0,
                gl_type: GL_FLOAT,
                values: vec![
                    AnyValue::F32(1.0),
                    AnyValue::F32(0.5),
                    AnyValue::F32(0.0),
                    AnyValue::F32(1.0),
                ],
                row_size: 4,
            }],
        }
        .into()
    }

    fn state(&self) -> Resource {
        StateResource {
            items: vec![
                StateItem {
                    name: "GL_CURRENT_PROGRAM".to_string(),
                    values: vec![AnyValue::U32(PROGRAM)],
                },
                StateItem {
                    name: "GL_ARRAY_BUFFER_BINDING".to_string(),
                    values: vec![AnyValue::U32(VERTEX_BUFFER)],
                },
                StateItem {
                    name: "GL_VIEWPORT".to_string(),
                    values: vec![
                        AnyValue::I32(0),
                        AnyValue::I32(0),
                        AnyValue::I32(640),
                        AnyValue::I32(480),
                    ],
                },
            ],
        }
        .into()
    }
}

impl ObjectInspector for SyntheticInspector {
    fn process_name(&self) -> String {
        "tracedbg-demo".to_string()
    }

    fn current_context(&self) -> ContextId {
        CONTEXT
    }

    fn context_reports(&self) -> Vec<ContextReport> {
        let mut report = ContextReport::new(CONTEXT);
        report
            .texture_space
            .insert(ContextObjectName::new(CONTEXT, TEXTURE));
        report
            .buffer_space
            .insert(ContextObjectName::new(CONTEXT, VERTEX_BUFFER));
        for id in self.shaders.keys() {
            report.shader_space.insert(ContextObjectName::new(CONTEXT, *id));
        }
        report
            .program_space
            .insert(ContextObjectName::new(CONTEXT, PROGRAM));
        vec![report]
    }

    fn query_resource(
        &mut self,
        object_type: ObjectType,
        name: ContextObjectName,
    ) -> Result<Resource, String> {
        if name.context != CONTEXT {
            return Err(format!("no context {:#x}", name.context));
        }
        match (object_type, name.name) {
            (ObjectType::Texture, TEXTURE) => self.texture(),
            (ObjectType::Buffer, VERTEX_BUFFER) => Ok(self.buffer()),
            (ObjectType::Shader, id) => self.shader(id),
            (ObjectType::Program, PROGRAM) => Ok(self.program()),
            (ObjectType::State, _) => Ok(self.state()),
            (ObjectType::Gpu, _) => Ok(GpuResource {
                renderer: "tracedbg synthetic renderer".to_string(),
                version: "2.1 tracedbg".to_string(),
                vendor: "tracedbg".to_string(),
                shading_language_version: "1.20".to_string(),
                memory: None,
            }
            .into()),
            (kind, id) => Err(format!("no {kind} {id} in context {CONTEXT:#x}")),
        }
    }

    fn edit_shader_source(&mut self, edit: &EditShaderSource) -> Result<(), String> {
        let shader = self
            .shaders
            .get_mut(&edit.shader_id)
            .ok_or_else(|| format!("no shader {}", edit.shader_id))?;
        shader.source = match (&edit.source, edit.reset) {
            (_, true) => shader.original.clone(),
            (Some(source), false) => source.clone(),
            (None, false) => return Err("edit carries no source".to_string()),
        };
        self.linked = false;
        Ok(())
    }

    fn force_link_program(&mut self, _context: ContextId, program: GlName) -> Result<(), String> {
        if program != PROGRAM {
            return Err(format!("no program {program}"));
        }
        self.linked = true;
        Ok(())
    }

    fn is_draw_call(&self, entrypoint: Entrypoint) -> bool {
        entrypoint == DRAW_ARRAYS
    }

    fn is_frame_delimiter(&self, entrypoint: Entrypoint) -> bool {
        entrypoint == SWAP_BUFFERS
    }
}

/// Run the frame loop until the controller terminates us or `frames` have
/// been drawn.
pub fn run(config: &Config, endpoint: Endpoint, frames: Option<u64>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let peer = DebugPeer::listen(
        runtime.handle(),
        &endpoint,
        SyntheticInspector::new(),
        config.peer.history_len,
    )
    .with_context(|| format!("failed to listen on {endpoint}"))?;

    let bound = peer.local_endpoint().unwrap_or(endpoint);
    println!("waiting for a controller on {bound}");
    peer.wait_for_controller()
        .context("controller never attached")?;

    let mut linker = Linker::default();
    let script = frame_script();
    let mut frame = 0u64;
    let mut result = replay(&peer, &mut linker, &setup_script());
    while result.is_ok() && frames.map_or(true, |limit| frame < limit) {
        result = replay(&peer, &mut linker, &script);
        if result.is_ok() {
            frame += 1;
            thread::sleep(Duration::from_millis(16));
        }
    }
    match result {
        Ok(()) => {
            info!("drew {} frame(s)", frame);
            Ok(())
        }
        Err(PeerError::TerminateRequested) => {
            info!("terminating after {} frame(s)", frame);
            println!("terminated by controller");
            Ok(())
        }
        Err(e) => Err(e).context("lost the controller"),
    }
}

fn replay(
    peer: &DebugPeer<SyntheticInspector>,
    linker: &mut Linker,
    script: &[CalledEntryPoint],
) -> Result<(), PeerError> {
    for call in script {
        peer.before_call(call)?;
        let ret = (call.entrypoint == GET_ERROR).then_some(AnyValue::Enum(0));
        let linked = linker.apply(call);
        peer.after_call(ret, 0, None)?;
        if !linked {
            info!(program = PROGRAM, "link failed");
            peer.report_compiler_error();
        }
    }
    Ok(())
}
