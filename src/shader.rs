//! Shader variants, their constant buffers and the uniform binding table.
//!
//! A [`Shader`] owns one linked program plus two zero-initialized byte
//! buffers (vertex and pixel constants). Higher-level renderers write their
//! `#[repr(C)]` constant structs into those buffers and bind each uniform
//! name to the byte offset of the matching field once, at load time. Every
//! draw then replays the bindings with [`Shader::submit_uniforms`].
//!
//! A shader whose program fails to link (or whose vertex layout can't be
//! translated) stays around as an inert value: binding reports
//! [`UniformBind::Missing`], submission does nothing and
//! [`Shader::is_valid`] is `false`.

use std::sync::Arc;

use bytemuck::Pod;

use crate::backend::{
    HostCallbacks, NativeGraphics, NativeVertexLayout, ProgramHandle, ShaderHandle, ShaderStage,
    UniformHandle, UniformKind, VertexLayoutHandle,
};
use crate::error::{RendererError, RendererResult};
use crate::layout::VertexLayout;

/// Maximum number of uniforms tracked per shader (both stages together).
pub const MAX_UNIFORMS: usize = 64;

/// Number of texture sampler slots per shader.
pub const MAX_SAMPLERS: usize = 8;

/// Shader variant: lighting model x distortion x feature tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Unlit,
    Lit,
    BackDistortion,
    AdvancedUnlit,
    AdvancedLit,
    AdvancedBackDistortion,
}

impl ShaderType {
    pub const ALL: [ShaderType; 6] = [
        ShaderType::Unlit,
        ShaderType::Lit,
        ShaderType::BackDistortion,
        ShaderType::AdvancedUnlit,
        ShaderType::AdvancedLit,
        ShaderType::AdvancedBackDistortion,
    ];

    /// Position in [`ShaderType::ALL`].
    pub fn index(&self) -> usize {
        match self {
            ShaderType::Unlit => 0,
            ShaderType::Lit => 1,
            ShaderType::BackDistortion => 2,
            ShaderType::AdvancedUnlit => 3,
            ShaderType::AdvancedLit => 4,
            ShaderType::AdvancedBackDistortion => 5,
        }
    }

    pub fn is_advanced(&self) -> bool {
        matches!(
            self,
            ShaderType::AdvancedUnlit
                | ShaderType::AdvancedLit
                | ShaderType::AdvancedBackDistortion
        )
    }

    pub fn is_lit(&self) -> bool {
        matches!(self, ShaderType::Lit | ShaderType::AdvancedLit)
    }

    pub fn is_distortion(&self) -> bool {
        matches!(
            self,
            ShaderType::BackDistortion | ShaderType::AdvancedBackDistortion
        )
    }

    /// Pick the variant for a draw. Distortion takes precedence over lighting.
    pub fn select(advanced: bool, lit: bool, distortion: bool) -> Self {
        match (advanced, distortion, lit) {
            (false, true, _) => ShaderType::BackDistortion,
            (false, false, true) => ShaderType::Lit,
            (false, false, false) => ShaderType::Unlit,
            (true, true, _) => ShaderType::AdvancedBackDistortion,
            (true, false, true) => ShaderType::AdvancedLit,
            (true, false, false) => ShaderType::AdvancedUnlit,
        }
    }

    /// Host shader name for sprite-like primitives.
    pub fn sprite_shader_name(&self) -> &'static str {
        match self {
            ShaderType::Unlit => "sprite_unlit",
            ShaderType::Lit => "sprite_lit",
            ShaderType::BackDistortion => "sprite_distortion",
            ShaderType::AdvancedUnlit => "sprite_adv_unlit",
            ShaderType::AdvancedLit => "sprite_adv_lit",
            ShaderType::AdvancedBackDistortion => "sprite_adv_distortion",
        }
    }

    /// Host shader name for model geometry.
    pub fn model_shader_name(&self) -> &'static str {
        match self {
            ShaderType::Unlit => "model_unlit",
            ShaderType::Lit => "model_lit",
            ShaderType::BackDistortion => "model_distortion",
            ShaderType::AdvancedUnlit => "model_adv_unlit",
            ShaderType::AdvancedLit => "model_adv_lit",
            ShaderType::AdvancedBackDistortion => "model_adv_distortion",
        }
    }
}

/// Which constant buffer of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantStage {
    Vertex,
    Pixel,
}

/// Target of an [`Shader::add_uniform`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformStage {
    /// Byte offset into the vertex constant buffer.
    Vertex,
    /// Byte offset into the pixel constant buffer.
    Pixel,
    /// Sampler slot index.
    Texture,
}

/// Outcome of a successful [`Shader::add_uniform`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformBind {
    Bound,
    /// The program doesn't reference the name. Optional uniforms are common.
    Missing,
}

/// Allocate-once, zero-initialized constant storage.
#[derive(Debug, Default)]
pub struct ConstantBuffer {
    data: Option<Vec<u8>>,
}

impl ConstantBuffer {
    /// Allocate `size` zeroed bytes. A zero size leaves the buffer untouched.
    pub fn allocate(&mut self, stage: ConstantStage, size: usize) -> RendererResult<()> {
        if size == 0 {
            return Ok(());
        }
        if self.data.is_some() {
            return Err(RendererError::ConstantBufferAlreadyAllocated(stage));
        }
        self.data = Some(vec![0; size]);
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Copy `bytes` in at `offset`.
    pub fn write(&mut self, stage: ConstantStage, offset: usize, bytes: &[u8]) -> RendererResult<()> {
        let data = self
            .data
            .as_mut()
            .ok_or(RendererError::ConstantBufferNotAllocated(stage))?;
        let capacity = data.len();
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= capacity)
            .ok_or(RendererError::ConstantWriteOutOfRange {
                offset,
                size: bytes.len(),
                capacity,
            })?;
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy a plain-old-data value in at `offset`.
    pub fn write_pod<T: Pod>(
        &mut self,
        stage: ConstantStage,
        offset: usize,
        value: &T,
    ) -> RendererResult<()> {
        self.write(stage, offset, bytemuck::bytes_of(value))
    }
}

#[derive(Debug, Clone)]
struct UniformSlot {
    handle: UniformHandle,
    name: String,
    kind: UniformKind,
    num: u16,
    /// Buffer and byte offset this slot reads from, once bound.
    binding: Option<(ConstantStage, usize)>,
}

/// A linked shader variant with its constant buffers and uniform table.
pub struct Shader {
    native: Arc<dyn NativeGraphics>,
    name: String,
    program: Option<ProgramHandle>,
    layout: Option<VertexLayoutHandle>,
    native_layout: NativeVertexLayout,
    vertex_constants: ConstantBuffer,
    pixel_constants: ConstantBuffer,
    uniforms: Vec<UniformSlot>,
    vertex_uniform_count: usize,
    samplers: [Option<UniformHandle>; MAX_SAMPLERS],
}

impl Shader {
    /// Load both stages of `name` through the host and link them.
    pub fn load(
        native: Arc<dyn NativeGraphics>,
        host: &dyn HostCallbacks,
        name: &str,
        layout: &VertexLayout,
    ) -> RendererResult<Self> {
        let vs = host.load_shader(None, name, ShaderStage::Vertex);
        let fs = host.load_shader(None, name, ShaderStage::Fragment);
        Self::new(native, name, vs, fs, layout)
    }

    /// Link `vs` and `fs` and gather their uniforms.
    ///
    /// Missing stages, link failures and untranslatable layouts produce an
    /// inert shader. Only native allocation failures are returned as errors.
    pub fn new(
        native: Arc<dyn NativeGraphics>,
        name: &str,
        vs: Option<ShaderHandle>,
        fs: Option<ShaderHandle>,
        layout: &VertexLayout,
    ) -> RendererResult<Self> {
        let mut shader = Self {
            native: native.clone(),
            name: name.to_string(),
            program: None,
            layout: None,
            native_layout: NativeVertexLayout::new(),
            vertex_constants: ConstantBuffer::default(),
            pixel_constants: ConstantBuffer::default(),
            uniforms: Vec::new(),
            vertex_uniform_count: 0,
            samplers: [None; MAX_SAMPLERS],
        };

        let native_layout = match layout.translate() {
            Ok(native_layout) => native_layout,
            Err(e) => {
                log::warn!("Shader {name}: {e}; shader is disabled");
                return Ok(shader);
            }
        };

        let (Some(vs), Some(fs)) = (vs, fs) else {
            log::warn!("Shader {name}: host did not provide both stages; shader is disabled");
            return Ok(shader);
        };

        let Some(program) = native.create_program(vs, fs) else {
            log::warn!("Shader {name}: program link failed; shader is disabled");
            return Ok(shader);
        };
        shader.program = Some(program);
        shader.layout = Some(native.create_vertex_layout(&native_layout)?);
        shader.native_layout = native_layout;

        for handle in native.shader_uniforms(vs) {
            shader.push_uniform(handle);
        }
        shader.vertex_uniform_count = shader.uniforms.len();
        for handle in native.shader_uniforms(fs) {
            shader.push_uniform(handle);
        }

        log::debug!(
            "Shader {name}: linked with {} vertex and {} pixel uniforms",
            shader.vertex_uniform_count,
            shader.uniforms.len() - shader.vertex_uniform_count
        );
        Ok(shader)
    }

    fn push_uniform(&mut self, handle: UniformHandle) {
        if self.uniforms.len() >= MAX_UNIFORMS {
            log::warn!(
                "Shader {}: more than {MAX_UNIFORMS} uniforms, ignoring the rest",
                self.name
            );
            return;
        }
        let info = self.native.uniform_info(handle);
        self.uniforms.push(UniformSlot {
            handle,
            name: info.name,
            kind: info.kind,
            num: info.num,
            binding: None,
        });
    }

    /// `false` once linking or layout translation failed.
    pub fn is_valid(&self) -> bool {
        self.program.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn layout(&self) -> Option<VertexLayoutHandle> {
        self.layout
    }

    pub fn native_layout(&self) -> &NativeVertexLayout {
        &self.native_layout
    }

    /// Allocate the vertex constant buffer. Allowed once.
    pub fn set_vertex_constant_buffer_size(&mut self, size: usize) -> RendererResult<()> {
        self.vertex_constants.allocate(ConstantStage::Vertex, size)
    }

    /// Allocate the pixel constant buffer. Allowed once.
    pub fn set_pixel_constant_buffer_size(&mut self, size: usize) -> RendererResult<()> {
        self.pixel_constants.allocate(ConstantStage::Pixel, size)
    }

    pub fn vertex_constants(&self) -> &ConstantBuffer {
        &self.vertex_constants
    }

    pub fn pixel_constants(&self) -> &ConstantBuffer {
        &self.pixel_constants
    }

    pub fn write_vertex_constants(&mut self, offset: usize, bytes: &[u8]) -> RendererResult<()> {
        self.vertex_constants
            .write(ConstantStage::Vertex, offset, bytes)
    }

    pub fn write_pixel_constants(&mut self, offset: usize, bytes: &[u8]) -> RendererResult<()> {
        self.pixel_constants.write(ConstantStage::Pixel, offset, bytes)
    }

    /// Bind a uniform name to a byte offset, or a sampler name to a slot.
    ///
    /// For [`UniformStage::Vertex`] and [`UniformStage::Pixel`] only the
    /// uniforms of that stage are searched. A name the program doesn't use
    /// yields `Ok(UniformBind::Missing)`; binding the same name twice is an
    /// error, as is a binding whose `element size x arity` bytes don't fit
    /// the stage's constant buffer.
    pub fn add_uniform(
        &mut self,
        name: &str,
        stage: UniformStage,
        offset: usize,
    ) -> RendererResult<UniformBind> {
        if !self.is_valid() {
            return Ok(UniformBind::Missing);
        }

        let constant_stage = match stage {
            UniformStage::Texture => return self.add_sampler(name, offset),
            UniformStage::Vertex => ConstantStage::Vertex,
            UniformStage::Pixel => ConstantStage::Pixel,
        };
        let range = match constant_stage {
            ConstantStage::Vertex => 0..self.vertex_uniform_count,
            ConstantStage::Pixel => self.vertex_uniform_count..self.uniforms.len(),
        };

        let mut seen = false;
        for slot in &mut self.uniforms[range] {
            if slot.name != name {
                continue;
            }
            seen = true;
            if slot.binding.is_none() {
                let capacity = match constant_stage {
                    ConstantStage::Vertex => self.vertex_constants.len(),
                    ConstantStage::Pixel => self.pixel_constants.len(),
                };
                let size = slot.kind.element_size() * usize::from(slot.num);
                if offset.checked_add(size).map_or(true, |end| end > capacity) {
                    return Err(RendererError::ConstantWriteOutOfRange {
                        offset,
                        size,
                        capacity,
                    });
                }
                slot.binding = Some((constant_stage, offset));
                log::trace!(
                    "Shader {}: bound {name} at {constant_stage:?}+{offset} x{}",
                    self.name,
                    slot.num
                );
                return Ok(UniformBind::Bound);
            }
        }

        if seen {
            Err(RendererError::UniformAlreadyBound(name.to_string()))
        } else {
            Ok(UniformBind::Missing)
        }
    }

    fn add_sampler(&mut self, name: &str, slot: usize) -> RendererResult<UniformBind> {
        if slot >= MAX_SAMPLERS {
            return Err(RendererError::SamplerSlotOutOfRange(slot));
        }
        if self.samplers[slot].is_some() {
            return Err(RendererError::SamplerSlotOccupied(slot));
        }
        let Some(uniform) = self.uniforms.iter().find(|u| u.name == name) else {
            return Ok(UniformBind::Missing);
        };
        if uniform.kind != UniformKind::Sampler {
            return Err(RendererError::NotASampler(name.to_string()));
        }
        self.samplers[slot] = Some(uniform.handle);
        Ok(UniformBind::Bound)
    }

    /// Sampler uniform bound to `slot`, if any.
    pub fn sampler(&self, slot: usize) -> Option<UniformHandle> {
        self.samplers.get(slot).copied().flatten()
    }

    /// Push every bound uniform's current bytes to the native layer.
    pub fn submit_uniforms(&self) {
        if !self.is_valid() {
            return;
        }
        for slot in &self.uniforms {
            let Some((stage, offset)) = slot.binding else {
                continue;
            };
            let buffer = match stage {
                ConstantStage::Vertex => self.vertex_constants.as_bytes(),
                ConstantStage::Pixel => self.pixel_constants.as_bytes(),
            };
            let size = slot.kind.element_size() * usize::from(slot.num);
            // Binding checked the range against the buffer.
            self.native
                .set_uniform(slot.handle, &buffer[offset..offset + size], slot.num);
        }
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Some(layout) = self.layout.take() {
            self.native.destroy_vertex_layout(layout);
        }
        if let Some(program) = self.program.take() {
            self.native.destroy_program(program);
        }
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("layout", &self.layout)
            .field("vertex_constants", &self.vertex_constants.len())
            .field("pixel_constants", &self.pixel_constants.len())
            .field("uniforms", &self.uniforms.len())
            .finish()
    }
}
