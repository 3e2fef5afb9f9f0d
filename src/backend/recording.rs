//! Recording backend for testing and development.
//!
//! [`RecordingGraphics`] doesn't talk to a GPU. It keeps every resource in
//! memory and records each call in order, so the renderer can be driven and
//! inspected without graphics hardware. [`CatalogHost`] is the matching host
//! side: a table of compiled shaders keyed by name and stage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::traits::{BackendError, BackendResult, HostCallbacks, NativeGraphics};
use super::types::*;

/// One recorded native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    CreateVertexLayout {
        handle: VertexLayoutHandle,
        stride: u32,
    },
    DestroyVertexLayout(VertexLayoutHandle),
    CreateProgram {
        vs: ShaderHandle,
        fs: ShaderHandle,
        program: Option<ProgramHandle>,
    },
    DestroyProgram(ProgramHandle),
    SetUniform {
        uniform: UniformHandle,
        data: Vec<u8>,
        num: u16,
    },
    CreateIndexBuffer {
        handle: IndexBufferHandle,
        stride: IndexStride,
        size: usize,
    },
    DestroyIndexBuffer(IndexBufferHandle),
    CreateVertexBuffer {
        handle: VertexBufferHandle,
        size: usize,
    },
    DestroyVertexBuffer(VertexBufferHandle),
    AllocTransientVertexBuffer {
        handle: TransientVertexBufferHandle,
        num_vertices: u32,
        stride: u32,
    },
    UpdateTransientVertexBuffer {
        handle: TransientVertexBufferHandle,
        offset: usize,
        size: usize,
    },
    CreateTexture {
        handle: TextureHandle,
        width: u32,
        height: u32,
    },
    DestroyTexture(TextureHandle),
    SetState(StateFlags),
    SetTexture {
        stage: u8,
        sampler: UniformHandle,
        texture: TextureHandle,
        flags: SamplerFlags,
    },
    SetTransientVertexBuffer {
        stream: u8,
        buffer: TransientVertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    },
    SetVertexBuffer {
        stream: u8,
        buffer: VertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    },
    SetIndexBuffer {
        buffer: IndexBufferHandle,
        first_index: u32,
        num_indices: u32,
    },
    SetInstanceCount(u32),
    Submit {
        view: ViewId,
        program: ProgramHandle,
    },
}

#[derive(Debug)]
struct ShaderEntry {
    uniforms: Vec<UniformHandle>,
    links: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u32,
    calls: Vec<NativeCall>,
    shaders: HashMap<ShaderHandle, ShaderEntry>,
    uniforms: Vec<UniformInfo>,
    uniform_names: HashMap<String, UniformHandle>,
    layouts: HashSet<VertexLayoutHandle>,
    programs: HashSet<ProgramHandle>,
    index_buffers: HashMap<IndexBufferHandle, (IndexStride, Vec<u8>)>,
    vertex_buffers: HashMap<VertexBufferHandle, Vec<u8>>,
    transient: HashMap<TransientVertexBufferHandle, Vec<u8>>,
    textures: HashSet<TextureHandle>,
    fail_allocations: bool,
}

impl Inner {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn uniform(&mut self, name: &str, kind: UniformKind, num: u16) -> UniformHandle {
        if let Some(handle) = self.uniform_names.get(name) {
            return *handle;
        }
        let handle = UniformHandle(self.uniforms.len() as u32);
        self.uniforms.push(UniformInfo {
            name: name.to_string(),
            kind,
            num,
        });
        self.uniform_names.insert(name.to_string(), handle);
        handle
    }

    fn check_allocation(&self, what: &str) -> BackendResult<()> {
        if self.fail_allocations {
            log::trace!("RecordingGraphics: refusing allocation of {what}");
            return Err(BackendError::OutOfMemory);
        }
        Ok(())
    }
}

/// In-memory [`NativeGraphics`] implementation that records every call.
#[derive(Debug, Default)]
pub struct RecordingGraphics {
    inner: Mutex<Inner>,
}

impl RecordingGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled shader stage referencing the given uniforms.
    ///
    /// Uniforms are global by name: registering the same name twice yields
    /// the same handle, keeping the first kind and element count.
    pub fn register_shader(&self, uniforms: &[(&str, UniformKind, u16)]) -> ShaderHandle {
        self.register(uniforms, true)
    }

    /// Register a shader stage that fails to link into any program
    pub fn register_broken_shader(&self, uniforms: &[(&str, UniformKind, u16)]) -> ShaderHandle {
        self.register(uniforms, false)
    }

    fn register(&self, uniforms: &[(&str, UniformKind, u16)], links: bool) -> ShaderHandle {
        let mut inner = self.inner.lock();
        let handle = ShaderHandle(inner.next());
        let uniforms: Vec<UniformHandle> = uniforms
            .iter()
            .map(|(name, kind, num)| inner.uniform(name, *kind, *num))
            .collect();
        inner.shaders.insert(handle, ShaderEntry { uniforms, links });
        handle
    }

    /// Make every following buffer, texture and layout creation fail
    pub fn set_fail_allocations(&self, fail: bool) {
        self.inner.lock().fail_allocations = fail;
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Recorded `set_uniform` calls as `(uniform, data, num)`
    pub fn uniform_sets(&self) -> Vec<(UniformHandle, Vec<u8>, u16)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::SetUniform { uniform, data, num } => {
                    Some((*uniform, data.clone(), *num))
                }
                _ => None,
            })
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, NativeCall::Submit { .. }))
            .count()
    }

    /// Most recent `set_state` value
    pub fn last_state(&self) -> Option<StateFlags> {
        self.inner.lock().calls.iter().rev().find_map(|call| match call {
            NativeCall::SetState(state) => Some(*state),
            _ => None,
        })
    }

    pub fn uniform_handle(&self, name: &str) -> Option<UniformHandle> {
        self.inner.lock().uniform_names.get(name).copied()
    }

    pub fn index_buffer_data(&self, buffer: IndexBufferHandle) -> Option<(IndexStride, Vec<u8>)> {
        self.inner.lock().index_buffers.get(&buffer).cloned()
    }

    pub fn vertex_buffer_data(&self, buffer: VertexBufferHandle) -> Option<Vec<u8>> {
        self.inner.lock().vertex_buffers.get(&buffer).cloned()
    }

    pub fn transient_data(&self, buffer: TransientVertexBufferHandle) -> Option<Vec<u8>> {
        self.inner.lock().transient.get(&buffer).cloned()
    }

    pub fn live_textures(&self) -> usize {
        self.inner.lock().textures.len()
    }

    pub fn live_index_buffers(&self) -> usize {
        self.inner.lock().index_buffers.len()
    }

    pub fn live_vertex_buffers(&self) -> usize {
        self.inner.lock().vertex_buffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.inner.lock().programs.len()
    }

    pub fn live_layouts(&self) -> usize {
        self.inner.lock().layouts.len()
    }
}

impl NativeGraphics for RecordingGraphics {
    fn name(&self) -> &str {
        "Recording"
    }

    fn create_vertex_layout(
        &self,
        layout: &NativeVertexLayout,
    ) -> BackendResult<VertexLayoutHandle> {
        let mut inner = self.inner.lock();
        if inner.fail_allocations {
            return Err(BackendError::VertexLayoutCreationFailed(
                "allocation failure requested".to_string(),
            ));
        }
        let handle = VertexLayoutHandle(inner.next());
        inner.layouts.insert(handle);
        inner.calls.push(NativeCall::CreateVertexLayout {
            handle,
            stride: layout.stride,
        });
        Ok(handle)
    }

    fn destroy_vertex_layout(&self, layout: VertexLayoutHandle) {
        let mut inner = self.inner.lock();
        inner.layouts.remove(&layout);
        inner.calls.push(NativeCall::DestroyVertexLayout(layout));
    }

    fn create_program(&self, vs: ShaderHandle, fs: ShaderHandle) -> Option<ProgramHandle> {
        let mut inner = self.inner.lock();
        let links = |handle: &ShaderHandle| inner.shaders.get(handle).is_some_and(|s| s.links);
        let program = if links(&vs) && links(&fs) {
            let program = ProgramHandle(inner.next());
            inner.programs.insert(program);
            Some(program)
        } else {
            None
        };
        inner
            .calls
            .push(NativeCall::CreateProgram { vs, fs, program });
        program
    }

    fn destroy_program(&self, program: ProgramHandle) {
        let mut inner = self.inner.lock();
        inner.programs.remove(&program);
        inner.calls.push(NativeCall::DestroyProgram(program));
    }

    fn shader_uniforms(&self, shader: ShaderHandle) -> Vec<UniformHandle> {
        self.inner
            .lock()
            .shaders
            .get(&shader)
            .map(|s| s.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_info(&self, uniform: UniformHandle) -> UniformInfo {
        let inner = self.inner.lock();
        inner
            .uniforms
            .get(uniform.0 as usize)
            .cloned()
            .unwrap_or(UniformInfo {
                name: String::new(),
                kind: UniformKind::Vec4,
                num: 0,
            })
    }

    fn set_uniform(&self, uniform: UniformHandle, data: &[u8], num: u16) {
        self.inner.lock().calls.push(NativeCall::SetUniform {
            uniform,
            data: data.to_vec(),
            num,
        });
    }

    fn create_index_buffer(
        &self,
        data: &[u8],
        stride: IndexStride,
    ) -> BackendResult<IndexBufferHandle> {
        let mut inner = self.inner.lock();
        inner.check_allocation("index buffer")?;
        let handle = IndexBufferHandle(inner.next());
        inner.index_buffers.insert(handle, (stride, data.to_vec()));
        inner.calls.push(NativeCall::CreateIndexBuffer {
            handle,
            stride,
            size: data.len(),
        });
        Ok(handle)
    }

    fn destroy_index_buffer(&self, buffer: IndexBufferHandle) {
        let mut inner = self.inner.lock();
        inner.index_buffers.remove(&buffer);
        inner.calls.push(NativeCall::DestroyIndexBuffer(buffer));
    }

    fn create_vertex_buffer(
        &self,
        data: &[u8],
        _layout: &NativeVertexLayout,
    ) -> BackendResult<VertexBufferHandle> {
        let mut inner = self.inner.lock();
        inner.check_allocation("vertex buffer")?;
        let handle = VertexBufferHandle(inner.next());
        inner.vertex_buffers.insert(handle, data.to_vec());
        inner.calls.push(NativeCall::CreateVertexBuffer {
            handle,
            size: data.len(),
        });
        Ok(handle)
    }

    fn destroy_vertex_buffer(&self, buffer: VertexBufferHandle) {
        let mut inner = self.inner.lock();
        inner.vertex_buffers.remove(&buffer);
        inner.calls.push(NativeCall::DestroyVertexBuffer(buffer));
    }

    fn alloc_transient_vertex_buffer(
        &self,
        num_vertices: u32,
        layout: &NativeVertexLayout,
    ) -> BackendResult<TransientVertexBufferHandle> {
        let mut inner = self.inner.lock();
        if inner.fail_allocations {
            return Err(BackendError::TransientAllocationFailed(format!(
                "{num_vertices} vertices"
            )));
        }
        let handle = TransientVertexBufferHandle(inner.next());
        let size = num_vertices as usize * layout.stride as usize;
        inner.transient.insert(handle, vec![0; size]);
        inner.calls.push(NativeCall::AllocTransientVertexBuffer {
            handle,
            num_vertices,
            stride: layout.stride,
        });
        Ok(handle)
    }

    fn update_transient_vertex_buffer(
        &self,
        buffer: TransientVertexBufferHandle,
        offset: usize,
        data: &[u8],
    ) {
        let mut inner = self.inner.lock();
        if let Some(storage) = inner.transient.get_mut(&buffer) {
            let end = (offset + data.len()).min(storage.len());
            if offset < end {
                storage[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
        inner.calls.push(NativeCall::UpdateTransientVertexBuffer {
            handle: buffer,
            offset,
            size: data.len(),
        });
    }

    fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        _format: TextureFormat,
        _data: &[u8],
    ) -> BackendResult<TextureHandle> {
        let mut inner = self.inner.lock();
        if inner.fail_allocations {
            return Err(BackendError::TextureCreationFailed(format!(
                "{width}x{height}"
            )));
        }
        let handle = TextureHandle(inner.next());
        inner.textures.insert(handle);
        inner.calls.push(NativeCall::CreateTexture {
            handle,
            width,
            height,
        });
        Ok(handle)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut inner = self.inner.lock();
        inner.textures.remove(&texture);
        inner.calls.push(NativeCall::DestroyTexture(texture));
    }

    fn set_state(&self, state: StateFlags) {
        self.inner.lock().calls.push(NativeCall::SetState(state));
    }

    fn set_texture(
        &self,
        stage: u8,
        sampler: UniformHandle,
        texture: TextureHandle,
        flags: SamplerFlags,
    ) {
        self.inner.lock().calls.push(NativeCall::SetTexture {
            stage,
            sampler,
            texture,
            flags,
        });
    }

    fn set_transient_vertex_buffer(
        &self,
        stream: u8,
        buffer: TransientVertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    ) {
        self.inner
            .lock()
            .calls
            .push(NativeCall::SetTransientVertexBuffer {
                stream,
                buffer,
                start_vertex,
                num_vertices,
                layout,
            });
    }

    fn set_vertex_buffer(
        &self,
        stream: u8,
        buffer: VertexBufferHandle,
        start_vertex: u32,
        num_vertices: u32,
        layout: VertexLayoutHandle,
    ) {
        self.inner.lock().calls.push(NativeCall::SetVertexBuffer {
            stream,
            buffer,
            start_vertex,
            num_vertices,
            layout,
        });
    }

    fn set_index_buffer(&self, buffer: IndexBufferHandle, first_index: u32, num_indices: u32) {
        self.inner.lock().calls.push(NativeCall::SetIndexBuffer {
            buffer,
            first_index,
            num_indices,
        });
    }

    fn set_instance_count(&self, count: u32) {
        self.inner
            .lock()
            .calls
            .push(NativeCall::SetInstanceCount(count));
    }

    fn submit(&self, view: ViewId, program: ProgramHandle) {
        log::trace!("RecordingGraphics: submit view={} program={:?}", view.0, program);
        self.inner
            .lock()
            .calls
            .push(NativeCall::Submit { view, program });
    }
}

/// Host callback table backed by an explicit shader catalog.
///
/// Textures "loaded" through it are 1x1 textures created on the recording
/// backend, so their release can be observed there.
#[derive(Debug)]
pub struct CatalogHost {
    native: Arc<RecordingGraphics>,
    shaders: Mutex<HashMap<(String, ShaderStage), ShaderHandle>>,
    loaded: Mutex<Vec<(String, bool, TextureHandle)>>,
    unloaded: Mutex<Vec<TextureHandle>>,
}

impl CatalogHost {
    pub fn new(native: Arc<RecordingGraphics>) -> Self {
        Self {
            native,
            shaders: Mutex::new(HashMap::new()),
            loaded: Mutex::new(Vec::new()),
            unloaded: Mutex::new(Vec::new()),
        }
    }

    /// Catalog holding every sprite and model shader the renderer loads, each
    /// declaring the uniforms the renderer binds.
    pub fn with_standard_shaders(native: Arc<RecordingGraphics>) -> Self {
        let host = Self::new(native);
        for name in [
            "sprite_unlit",
            "sprite_lit",
            "sprite_distortion",
            "sprite_adv_unlit",
            "sprite_adv_lit",
            "sprite_adv_distortion",
        ] {
            let vs = host.native.register_shader(SPRITE_VERTEX_UNIFORMS);
            let fs = host.native.register_shader(&fragment_uniforms(name));
            host.add_program(name, vs, fs);
        }
        for name in ["model_unlit", "model_lit", "model_distortion"] {
            let vs = host.native.register_shader(MODEL_VERTEX_UNIFORMS);
            let fs = host.native.register_shader(&fragment_uniforms(name));
            host.add_program(name, vs, fs);
        }
        for name in ["model_adv_unlit", "model_adv_lit", "model_adv_distortion"] {
            let vs = host.native.register_shader(MODEL_ADVANCED_VERTEX_UNIFORMS);
            let fs = host.native.register_shader(&fragment_uniforms(name));
            host.add_program(name, vs, fs);
        }
        host
    }

    pub fn native(&self) -> &Arc<RecordingGraphics> {
        &self.native
    }

    pub fn add_shader(&self, name: &str, stage: ShaderStage, shader: ShaderHandle) {
        self.shaders.lock().insert((name.to_string(), stage), shader);
    }

    pub fn add_program(&self, name: &str, vs: ShaderHandle, fs: ShaderHandle) {
        self.add_shader(name, ShaderStage::Vertex, vs);
        self.add_shader(name, ShaderStage::Fragment, fs);
    }

    /// Paths passed to `load_texture`, with their sRGB flag
    pub fn loaded_paths(&self) -> Vec<(String, bool)> {
        self.loaded
            .lock()
            .iter()
            .map(|(path, srgb, _)| (path.clone(), *srgb))
            .collect()
    }

    pub fn unloaded(&self) -> Vec<TextureHandle> {
        self.unloaded.lock().clone()
    }
}

impl HostCallbacks for CatalogHost {
    fn load_shader(
        &self,
        _material: Option<&str>,
        name: &str,
        stage: ShaderStage,
    ) -> Option<ShaderHandle> {
        self.shaders.lock().get(&(name.to_string(), stage)).copied()
    }

    fn load_texture(&self, path: &str, srgb: bool) -> Option<TextureHandle> {
        let texture = self
            .native
            .create_texture_2d(1, 1, TextureFormat::Rgba8, &[255; 4])
            .ok()?;
        self.loaded.lock().push((path.to_string(), srgb, texture));
        Some(texture)
    }

    fn unload_texture(&self, texture: TextureHandle) {
        self.unloaded.lock().push(texture);
        self.native.destroy_texture(texture);
    }
}

const SPRITE_VERTEX_UNIFORMS: &[(&str, UniformKind, u16)] = &[
    ("u_Camera", UniformKind::Mat4, 1),
    ("u_CameraProj", UniformKind::Mat4, 1),
    ("u_UVInversed", UniformKind::Vec4, 1),
    ("u_vsFlipbookParameter", UniformKind::Vec4, 1),
];

const MODEL_VERTEX_UNIFORMS: &[(&str, UniformKind, u16)] = &[
    ("u_Camera", UniformKind::Mat4, 1),
    ("u_Model", UniformKind::Mat4, 20),
    ("u_ModelUV", UniformKind::Vec4, 20),
    ("u_ModelColor", UniformKind::Vec4, 20),
    ("u_LightDirection", UniformKind::Vec4, 1),
    ("u_LightColor", UniformKind::Vec4, 1),
    ("u_LightAmbientColor", UniformKind::Vec4, 1),
    ("u_UVInversed", UniformKind::Vec4, 1),
];

const MODEL_ADVANCED_VERTEX_UNIFORMS: &[(&str, UniformKind, u16)] = &[
    ("u_Camera", UniformKind::Mat4, 1),
    ("u_Model", UniformKind::Mat4, 20),
    ("u_ModelUV", UniformKind::Vec4, 20),
    ("u_ModelAlphaUV", UniformKind::Vec4, 20),
    ("u_ModelUVDistortionUV", UniformKind::Vec4, 20),
    ("u_ModelBlendUV", UniformKind::Vec4, 20),
    ("u_ModelBlendAlphaUV", UniformKind::Vec4, 20),
    ("u_ModelBlendUVDistortionUV", UniformKind::Vec4, 20),
    ("u_ModelFlipbookParameter", UniformKind::Vec4, 1),
    ("u_ModelFlipbookIndexAndNextRate", UniformKind::Vec4, 20),
    ("u_ModelAlphaThreshold", UniformKind::Vec4, 20),
    ("u_ModelColor", UniformKind::Vec4, 20),
    ("u_LightDirection", UniformKind::Vec4, 1),
    ("u_LightColor", UniformKind::Vec4, 1),
    ("u_LightAmbientColor", UniformKind::Vec4, 1),
    ("u_UVInversed", UniformKind::Vec4, 1),
];

const PIXEL_UNIFORMS: &[(&str, UniformKind, u16)] = &[
    ("u_LightDirection", UniformKind::Vec4, 1),
    ("u_LightColor", UniformKind::Vec4, 1),
    ("u_LightAmbientColor", UniformKind::Vec4, 1),
    ("u_FlipbookParam", UniformKind::Vec4, 1),
    ("u_UVDistortionParam", UniformKind::Vec4, 1),
    ("u_BlendTextureParam", UniformKind::Vec4, 1),
    ("u_CameraFrontDirection", UniformKind::Vec4, 1),
    ("u_FalloffParam", UniformKind::Vec4, 3),
    ("u_EmmisiveParam", UniformKind::Vec4, 1),
    ("u_EdgeParam", UniformKind::Vec4, 2),
    ("u_SoftParticleParam", UniformKind::Vec4, 3),
    ("u_UVInversedBack", UniformKind::Vec4, 1),
    ("u_MiscFlags", UniformKind::Vec4, 1),
];

const DISTORTION_PIXEL_UNIFORMS: &[(&str, UniformKind, u16)] = &[
    ("u_DistortionIntencity", UniformKind::Vec4, 1),
    ("u_UVInversedBack", UniformKind::Vec4, 1),
    ("u_FlipbookParam", UniformKind::Vec4, 1),
    ("u_BlendTextureParam", UniformKind::Vec4, 1),
    ("u_SoftParticleParam", UniformKind::Vec4, 3),
];

fn fragment_uniforms(name: &str) -> Vec<(&'static str, UniformKind, u16)> {
    let mut uniforms = vec![("s_sampler_colorTex", UniformKind::Sampler, 1)];
    if name.ends_with("_lit") {
        uniforms.push(("s_sampler_normalTex", UniformKind::Sampler, 1));
    }
    if name.ends_with("distortion") {
        uniforms.extend_from_slice(DISTORTION_PIXEL_UNIFORMS);
    } else {
        uniforms.extend_from_slice(PIXEL_UNIFORMS);
    }
    uniforms
}
