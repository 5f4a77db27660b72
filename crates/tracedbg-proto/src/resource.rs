//! Snapshot records of traced objects.
//!
//! The peer's inspector builds one of these when asked to query a live
//! object; it travels back to the controller inside a
//! [`RequestReply`](crate::message::RequestReply). Pixel data is kept raw:
//! format and type enums are forwarded as-is and never decoded here.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::tagged::tagged_union;
use crate::types::{AnyValue, GlName, ObjectType};

/// A rectangle of raw pixel storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRectangle {
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub samples: u32,
    pub format: u32,
    pub data_type: u32,
    pub internal_format: u32,
    pub storage: Vec<u8>,
}

impl PixelRectangle {
    /// Build a single-sample rectangle, checking that `storage` holds exactly
    /// `height * row_bytes` bytes.
    pub fn new(
        width: u32,
        height: u32,
        row_bytes: u32,
        format: u32,
        data_type: u32,
        internal_format: u32,
        storage: Vec<u8>,
    ) -> Result<Self, ProtoError> {
        let expected = height as usize * row_bytes as usize;
        if storage.len() != expected {
            return Err(ProtoError::PixelStorage {
                expected,
                actual: storage.len(),
            });
        }
        Ok(Self {
            width,
            height,
            row_bytes,
            samples: 1,
            format,
            data_type,
            internal_format,
            storage,
        })
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

/// All faces of a texture, each with its mip levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureResource {
    pub faces: Vec<Vec<PixelRectangle>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferResource {
    pub data: Vec<u8>,
}

/// Contents of the default framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramebufferResource {
    pub rect: PixelRectangle,
}

/// One attachment point of a framebuffer object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FboAttachment {
    /// Attachment point enum.
    pub id: u32,
    /// Pixels, or the reason they could not be read back.
    pub result: Result<PixelRectangle, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FboResource {
    pub attachments: Vec<FboAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderbufferResource {
    pub rect: PixelRectangle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderResource {
    pub source: String,
    pub deleted: bool,
    pub compile_ok: bool,
    /// Compiler log text, verbatim.
    pub compile_status: String,
}

/// One active uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uniform {
    pub name: String,
    pub location: i32,
    pub gl_type: u32,
    pub values: Vec<AnyValue>,
    /// Values per row, for matrix and vector types.
    pub row_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramResource {
    pub link_ok: bool,
    pub link_status: String,
    /// `(shader name, shader type)` pairs.
    pub attached_shaders: Vec<(GlName, u32)>,
    pub uniforms: Vec<Uniform>,
}

/// Video memory counters, when the driver exposes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuMemoryInfo {
    pub dedicated_kb: i64,
    pub total_available_kb: i64,
    pub current_available_kb: i64,
    pub eviction_count: i64,
    pub evicted_kb: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuResource {
    pub renderer: String,
    pub version: String,
    pub vendor: String,
    pub shading_language_version: String,
    pub memory: Option<GpuMemoryInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateItem {
    pub name: String,
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResource {
    pub items: Vec<StateItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceResource {
    /// Symbolized frames, innermost first.
    pub frames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkResource {
    pub data: Vec<u8>,
}

tagged_union! {
    /// A snapshot of one traced object.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Resource {
        Texture(TextureResource) = "res.texture",
        Buffer(BufferResource) = "res.buffer",
        Framebuffer(FramebufferResource) = "res.framebuffer",
        Fbo(FboResource) = "res.fbo",
        Renderbuffer(RenderbufferResource) = "res.renderbuffer",
        Shader(ShaderResource) = "res.shader",
        Program(ProgramResource) = "res.program",
        Gpu(GpuResource) = "res.gpu",
        State(StateResource) = "res.state",
        Backtrace(BacktraceResource) = "res.backtrace",
        Benchmark(BenchmarkResource) = "res.benchmark",
    }
}

impl Resource {
    /// The object type a query must name to produce this record.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Resource::Texture(_) => ObjectType::Texture,
            Resource::Buffer(_) => ObjectType::Buffer,
            Resource::Framebuffer(_) => ObjectType::Framebuffer,
            Resource::Fbo(_) => ObjectType::Fbo,
            Resource::Renderbuffer(_) => ObjectType::Renderbuffer,
            Resource::Shader(_) => ObjectType::Shader,
            Resource::Program(_) => ObjectType::Program,
            Resource::Gpu(_) => ObjectType::Gpu,
            Resource::State(_) => ObjectType::State,
            Resource::Backtrace(_) => ObjectType::Backtrace,
            Resource::Benchmark(_) => ObjectType::Benchmark,
        }
    }
}
