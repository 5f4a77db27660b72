//! Identifiers and value records shared by the message and resource kinds.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one intercepted, traceable API call.
pub type Entrypoint = u32;

/// Opaque identifier of a traced execution context.
pub type ContextId = u64;

/// Object name inside a context (texture id, program id, ...).
pub type GlName = u32;

/// Identifies a traced object as `(context, name, target)`.
///
/// Only `context` and `name` take part in equality, ordering and hashing.
/// `target` is carried along for display and for the inspector's benefit,
/// but two names that differ only in target are the same object.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContextObjectName {
    pub context: ContextId,
    pub name: GlName,
    pub target: u32,
}

impl ContextObjectName {
    pub fn new(context: ContextId, name: GlName) -> Self {
        Self {
            context,
            name,
            target: 0,
        }
    }

    pub fn with_target(context: ContextId, name: GlName, target: u32) -> Self {
        Self {
            context,
            name,
            target,
        }
    }

    fn key(&self) -> (ContextId, GlName) {
        (self.context, self.name)
    }
}

impl PartialEq for ContextObjectName {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ContextObjectName {}

impl PartialOrd for ContextObjectName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContextObjectName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for ContextObjectName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for ContextObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.context, self.name)
    }
}

/// A single argument or return value of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnyValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(u64),
    FnPointer(u64),
    /// A symbolic GL enum value.
    Enum(u32),
}

impl fmt::Display for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyValue::I8(v) => write!(f, "{v}"),
            AnyValue::U8(v) => write!(f, "{v}"),
            AnyValue::I16(v) => write!(f, "{v}"),
            AnyValue::U16(v) => write!(f, "{v}"),
            AnyValue::I32(v) => write!(f, "{v}"),
            AnyValue::U32(v) => write!(f, "{v}"),
            AnyValue::I64(v) => write!(f, "{v}"),
            AnyValue::U64(v) => write!(f, "{v}"),
            AnyValue::F32(v) => write!(f, "{v}"),
            AnyValue::F64(v) => write!(f, "{v}"),
            AnyValue::Pointer(p) | AnyValue::FnPointer(p) => write!(f, "{p:#x}"),
            AnyValue::Enum(e) => write!(f, "{e:#06x}"),
        }
    }
}

/// One recorded call: entrypoint, arguments, and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalledEntryPoint {
    pub entrypoint: Entrypoint,
    pub args: Vec<AnyValue>,
    pub ret_val: Option<AnyValue>,
    /// Error code observed after the call, `0` when none.
    pub error: u32,
    pub debug_output: Option<String>,
}

impl CalledEntryPoint {
    pub fn new(entrypoint: Entrypoint, args: Vec<AnyValue>) -> Self {
        Self {
            entrypoint,
            args,
            ret_val: None,
            error: 0,
            debug_output: None,
        }
    }

    pub fn with_ret_val(mut self, value: AnyValue) -> Self {
        self.ret_val = Some(value);
        self
    }

    pub fn with_error(mut self, error: u32) -> Self {
        self.error = error;
        self
    }

    pub fn with_debug_output(mut self, text: impl Into<String>) -> Self {
        self.debug_output = Some(text.into());
        self
    }
}

impl fmt::Display for CalledEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}(", self.entrypoint)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
        if let Some(ret) = &self.ret_val {
            write!(f, " = {ret}")?;
        }
        if self.error != 0 {
            write!(f, " -> error {:#06x}", self.error)?;
        }
        Ok(())
    }
}

/// Kind of traced object a resource query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Texture,
    Buffer,
    Framebuffer,
    Fbo,
    Renderbuffer,
    Shader,
    Program,
    Gpu,
    State,
    Backtrace,
    Benchmark,
}

impl ObjectType {
    /// Every object type, in declaration order.
    pub const ALL: [ObjectType; 11] = [
        ObjectType::Texture,
        ObjectType::Buffer,
        ObjectType::Framebuffer,
        ObjectType::Fbo,
        ObjectType::Renderbuffer,
        ObjectType::Shader,
        ObjectType::Program,
        ObjectType::Gpu,
        ObjectType::State,
        ObjectType::Backtrace,
        ObjectType::Benchmark,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Texture => "texture",
            ObjectType::Buffer => "buffer",
            ObjectType::Framebuffer => "framebuffer",
            ObjectType::Fbo => "fbo",
            ObjectType::Renderbuffer => "renderbuffer",
            ObjectType::Shader => "shader",
            ObjectType::Program => "program",
            ObjectType::Gpu => "gpu",
            ObjectType::State => "state",
            ObjectType::Backtrace => "backtrace",
            ObjectType::Benchmark => "benchmark",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ObjectType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("unknown object type: {s}"))
    }
}

/// Granularity of a step request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepMode {
    /// Pause before the very next call.
    Call,
    /// Pause after the next draw call.
    DrawCall,
    /// Pause after the next frame delimiter.
    Frame,
}

impl FromStr for StepMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "call" => Ok(StepMode::Call),
            "draw" | "drawcall" | "draw_call" => Ok(StepMode::DrawCall),
            "frame" => Ok(StepMode::Frame),
            other => Err(format!("unknown step mode: {other}")),
        }
    }
}

/// Break-condition switches pushed to the peer at first-break sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakConfiguration {
    pub break_on_error: bool,
    pub break_on_debug_output: bool,
    pub break_on_compiler_error: bool,
    pub force_debug_context: bool,
    pub force_debug_context_es: bool,
}

impl Default for BreakConfiguration {
    fn default() -> Self {
        Self {
            break_on_error: true,
            break_on_debug_output: true,
            break_on_compiler_error: true,
            force_debug_context: false,
            force_debug_context_es: false,
        }
    }
}

/// Snapshot of the object names that exist in one context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub id: ContextId,
    pub texture_space: BTreeSet<ContextObjectName>,
    pub buffer_space: BTreeSet<ContextObjectName>,
    pub shader_space: BTreeSet<ContextObjectName>,
    pub program_space: BTreeSet<ContextObjectName>,
    pub fbo_space: BTreeSet<ContextObjectName>,
    pub framebuffer_space: BTreeSet<ContextObjectName>,
    pub renderbuffer_space: BTreeSet<ContextObjectName>,
    /// Bound textures, one set per texture unit.
    pub texture_unit_space: Vec<BTreeSet<ContextObjectName>>,
}

impl ContextReport {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// The name space holding objects of `object_type`, if the report keeps one.
    pub fn space(&self, object_type: ObjectType) -> Option<&BTreeSet<ContextObjectName>> {
        match object_type {
            ObjectType::Texture => Some(&self.texture_space),
            ObjectType::Buffer => Some(&self.buffer_space),
            ObjectType::Shader => Some(&self.shader_space),
            ObjectType::Program => Some(&self.program_space),
            ObjectType::Fbo => Some(&self.fbo_space),
            ObjectType::Framebuffer => Some(&self.framebuffer_space),
            ObjectType::Renderbuffer => Some(&self.renderbuffer_space),
            _ => None,
        }
    }

    pub fn space_mut(&mut self, object_type: ObjectType) -> Option<&mut BTreeSet<ContextObjectName>> {
        match object_type {
            ObjectType::Texture => Some(&mut self.texture_space),
            ObjectType::Buffer => Some(&mut self.buffer_space),
            ObjectType::Shader => Some(&mut self.shader_space),
            ObjectType::Program => Some(&mut self.program_space),
            ObjectType::Fbo => Some(&mut self.fbo_space),
            ObjectType::Framebuffer => Some(&mut self.framebuffer_space),
            ObjectType::Renderbuffer => Some(&mut self.renderbuffer_space),
            _ => None,
        }
    }
}
