//! Renderer error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::shader::{ConstantStage, ShaderType};

/// Errors that can occur in the effect renderer.
///
/// Native failures are wrapped as [`RendererError::Backend`]. The remaining
/// variants are configuration errors and misuse of the draw protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
    /// The native layer failed to create or allocate a resource.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A vertex element uses a semantic the translator doesn't know.
    #[error("unknown vertex semantic {name}{index}")]
    UnknownSemantic { name: String, index: u32 },

    /// A constant buffer was sized twice.
    #[error("{0:?} constant buffer is already allocated")]
    ConstantBufferAlreadyAllocated(ConstantStage),

    /// A constant write targeted a buffer that was never sized.
    #[error("{0:?} constant buffer is not allocated")]
    ConstantBufferNotAllocated(ConstantStage),

    /// A constant write ran past the end of its buffer.
    #[error("constant write of {size} bytes at offset {offset} exceeds buffer of {capacity} bytes")]
    ConstantWriteOutOfRange {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    /// A uniform name was bound a second time.
    #[error("uniform {0} is already bound")]
    UniformAlreadyBound(String),

    /// Sampler slot index outside `0..8`.
    #[error("sampler slot {0} is out of range")]
    SamplerSlotOutOfRange(usize),

    /// A sampler slot was bound a second time.
    #[error("sampler slot {0} is already bound")]
    SamplerSlotOccupied(usize),

    /// A texture binding named a uniform that isn't a sampler.
    #[error("uniform {0} is not a sampler")]
    NotASampler(String),

    /// `lock` called while the transient buffer was already locked.
    #[error("transient vertex buffer is already locked")]
    VertexBufferAlreadyLocked,

    /// `unlock` called without a matching lock.
    #[error("transient vertex buffer is not locked")]
    VertexBufferNotLocked,

    /// The frame's transient storage can't hold the requested bytes.
    #[error("transient vertex buffer is full: requested {requested} bytes, {remaining} remaining")]
    TransientBufferFull { requested: usize, remaining: usize },

    /// A frame-scoped operation ran outside `begin_rendering`/`end_rendering`.
    #[error("no frame in progress")]
    FrameNotStarted,

    /// Static buffers are immutable after creation.
    #[error("static buffers cannot be updated after creation")]
    ImmutableBuffer,

    /// `begin_shader` while another shader was active.
    #[error("a shader is already active")]
    ShaderAlreadyActive,

    /// `end_shader` with a shader other than the active one.
    #[error("end_shader called with a shader that is not active")]
    ShaderMismatch,

    /// A shader-scoped operation ran with no active shader.
    #[error("no active shader")]
    NoActiveShader,

    /// The requested shader variant was not loaded.
    #[error("shader variant {0:?} is not loaded")]
    ShaderNotLoaded(ShaderType),

    /// The entry point exists for interface compatibility only.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
