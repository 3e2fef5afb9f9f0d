//! Native capability table
//!
//! The renderer core never talks to a graphics API directly. Everything it needs
//! from the GPU side goes through [`NativeGraphics`], and everything it needs
//! from the embedding application goes through [`HostCallbacks`].

use crate::backend::types::*;
use thiserror::Error;

/// Native backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create vertex layout: {0}")]
    VertexLayoutCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to allocate transient vertex buffer: {0}")]
    TransientAllocationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Immediate-mode graphics API the renderer is built on.
///
/// Methods take `&self` because handles to the table are shared between the
/// renderer and the resources it hands out (textures and static buffers
/// release themselves through it). Implementations use interior mutability.
///
/// All calls happen on the thread that owns the graphics context.
pub trait NativeGraphics {
    /// Human readable device name
    fn name(&self) -> &str;

    // Layouts and programs

    fn create_vertex_layout(&self, layout: &NativeVertexLayout)
        -> BackendResult<VertexLayoutHandle>;

    fn destroy_vertex_layout(&self, layout: VertexLayoutHandle);

    /// Link a program. `None` means the link failed.
    fn create_program(&self, vs: ShaderHandle, fs: ShaderHandle) -> Option<ProgramHandle>;

    fn destroy_program(&self, program: ProgramHandle);

    /// Uniforms referenced by a compiled shader stage, in declaration order
    fn shader_uniforms(&self, shader: ShaderHandle) -> Vec<UniformHandle>;

    fn uniform_info(&self, uniform: UniformHandle) -> UniformInfo;

    /// Stage uniform data for the next submission
    fn set_uniform(&self, uniform: UniformHandle, data: &[u8], num: u16);

    // Buffers

    fn create_index_buffer(
        &self,
        data: &[u8],
        stride: IndexStride,
    ) -> BackendResult<IndexBufferHandle>;

    fn destroy_index_buffer(&self, buffer: IndexBufferHandle);

    fn create_vertex_buffer(
        &self,
        data: &[u8],
        layout: &NativeVertexLayout,
    ) -> BackendResult<VertexBufferHandle>;

    fn destroy_vertex_buffer(&self, buffer: VertexBufferHandle);

    /// Allocate storage that lives until the end of the current frame
    fn alloc_transient_vertex_buffer(
        &self,
        num_vertices: u32,
        layout: &NativeVertexLayout,
    ) -> BackendResult<TransientVertexBufferHandle>;

    /// Write into transient storage at a byte offset
    fn update_transient_vertex_buffer(
        &self,
        buffer: TransientVertexBufferHandle,
        offset: usize,
        data: &[u8],
    );

    // Textures

    fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: &[u8],
    ) -> BackendResult<TextureHandle>;

    fn destroy_texture(&self, texture: TextureHandle);

    // Submission state

    fn set_state(&self, state: StateFlags);

    fn set_texture(
        &self,
        stage: u8,
        sampler: UniformHandle,
        texture: TextureHandle,
        flags: SamplerFlags,
    );

    fn set_transient_vertex_buffer(
        &self,
        stream: u8,
        buffer: TransientVertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    );

    fn set_vertex_buffer(
        &self,
        stream: u8,
        buffer: VertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    );

    fn set_index_buffer(&self, buffer: IndexBufferHandle, first_index: u32, num_indices: u32);

    fn set_instance_count(&self, count: u32);

    /// Submit a draw with all state staged since the previous submission
    fn submit(&self, view: ViewId, program: ProgramHandle);
}

/// Callbacks supplied by the embedding application
pub trait HostCallbacks {
    /// Load a compiled shader stage, e.g. `("sprite_unlit", Vertex)`
    fn load_shader(
        &self,
        material: Option<&str>,
        name: &str,
        stage: ShaderStage,
    ) -> Option<ShaderHandle>;

    /// Load a texture from a path; `srgb` is set for color textures
    fn load_texture(&self, path: &str, srgb: bool) -> Option<TextureHandle>;

    /// Release a texture previously returned by [`HostCallbacks::load_texture`]
    fn unload_texture(&self, texture: TextureHandle);
}
