//! The effect renderer context.
//!
//! [`Renderer`] owns everything one backend instance needs: the loaded shader
//! variants, the per-frame transient vertex buffer, the shared sprite index
//! buffer, render state and the camera/lighting inputs. The host drives it
//! once per frame:
//!
//! ```ignore
//! renderer.begin_rendering()?;
//! sprites.begin_rendering(&mut renderer, &params, count)?;
//! for instance in &instances {
//!     sprites.rendering(&mut renderer, &params, instance)?;
//! }
//! sprites.end_rendering(&mut renderer, &params)?;
//! renderer.end_rendering()?;
//! ```
//!
//! Draw submission follows a fixed protocol: `begin_shader`, stage constants
//! with `set_vertex_buffer_to_shader` / `set_pixel_buffer_to_shader`,
//! `submit_uniforms`, apply render state, bind textures and geometry, draw,
//! `end_shader`.

use std::mem::size_of;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{
    HostCallbacks, NativeGraphics, ProgramHandle, VertexBufferHandle, VertexLayoutHandle, ViewId,
};
use crate::buffers::{StaticIndexBuffer, StaticVertexBuffer, TransientVertexBuffer};
use crate::config::{InitArgs, RendererSettings};
use crate::constants::{
    bind_model_uniforms, bind_sprite_uniforms, PixelConstants, NORMAL_TEXTURE_SLOT,
};
use crate::device::{GraphicsDevice, TextureParameter};
use crate::error::{RendererError, RendererResult};
use crate::layout::VertexLayout;
use crate::render_state::{RenderMode, RenderState, RenderStateTracker};
use crate::shader::{Shader, ShaderType, MAX_SAMPLERS};
use crate::standard::StandardRenderer;
use crate::texture::{Texture, TextureLoader};

/// Which family of shaders a variant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderFamily {
    /// Sprite, ribbon, ring and track primitives.
    Sprite,
    Model,
}

/// Identifies one loaded shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub family: ShaderFamily,
    pub ty: ShaderType,
}

impl ShaderKey {
    pub fn sprite(ty: ShaderType) -> Self {
        Self {
            family: ShaderFamily::Sprite,
            ty,
        }
    }

    pub fn model(ty: ShaderType) -> Self {
        Self {
            family: ShaderFamily::Model,
            ty,
        }
    }

    /// Vertex layout the shader was created with.
    pub fn vertex_layout(&self) -> VertexLayout {
        match self.family {
            ShaderFamily::Sprite => VertexLayout::standard(self.ty),
            ShaderFamily::Model => VertexLayout::model(),
        }
    }
}

/// Per-draw inputs shared by the pixel-constant writers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelInputs {
    pub flipbook_parameter: [f32; 4],
    pub distortion_intensity: f32,
    pub emissive_scaling: f32,
}

/// Effect renderer backend context.
pub struct Renderer {
    native: Arc<dyn NativeGraphics>,
    host: Arc<dyn HostCallbacks>,
    settings: RendererSettings,
    device: GraphicsDevice,

    sprite_shaders: [Option<Shader>; 6],
    model_shaders: [Option<Shader>; 6],
    current_shader: Option<ShaderKey>,
    current_layout: Option<VertexLayoutHandle>,
    /// Bytes per vertex of `current_layout`.
    current_stride: u32,
    current_vertex_buffer: Option<VertexBufferHandle>,

    render_state: RenderStateTracker,
    transient: TransientVertexBuffer,
    index_buffer: Arc<StaticIndexBuffer>,
    pub(crate) standard: StandardRenderer,

    white_texture: Arc<Texture>,
    normal_texture: Arc<Texture>,

    camera: Mat4,
    projection: Mat4,
    camera_projection: Mat4,
    light_direction: Vec3,
    light_color: Vec4,
    light_ambient_color: Vec4,
    uv_inversed: bool,
    in_frame: bool,
}

impl Renderer {
    /// Load shaders, create the shared buffers and the proxy textures.
    ///
    /// Shader variants that fail to link are kept inert; their draws are
    /// skipped. Native allocation failures abort initialization.
    pub fn new(args: InitArgs) -> RendererResult<Self> {
        let InitArgs {
            native,
            host,
            settings,
        } = args;
        log::debug!(
            "Initializing effect renderer on {} (view {}, {} squares)",
            native.name(),
            settings.view_id.0,
            settings.square_max_count
        );
        if settings.square_max_count == 0 {
            return Err(RendererError::InvalidParameter(
                "square_max_count must be positive".to_string(),
            ));
        }

        let device = GraphicsDevice::new(native.clone())?;

        let mut sprite_shaders: [Option<Shader>; 6] = std::array::from_fn(|_| None);
        for ty in &settings.sprite_shaders {
            let mut shader = Shader::load(
                native.clone(),
                host.as_ref(),
                ty.sprite_shader_name(),
                &VertexLayout::standard(*ty),
            )?;
            bind_sprite_uniforms(&mut shader, *ty)?;
            sprite_shaders[ty.index()] = Some(shader);
        }

        let mut model_shaders: [Option<Shader>; 6] = std::array::from_fn(|_| None);
        for ty in ShaderType::ALL {
            let mut shader = Shader::load(
                native.clone(),
                host.as_ref(),
                ty.model_shader_name(),
                &VertexLayout::model(),
            )?;
            bind_model_uniforms(&mut shader, ty)?;
            model_shaders[ty.index()] = Some(shader);
        }

        let widest = ShaderType::ALL
            .iter()
            .map(|ty| VertexLayout::standard(*ty))
            .max_by_key(VertexLayout::stride)
            .unwrap_or_default()
            .translate()?;
        let transient =
            TransientVertexBuffer::new(native.clone(), settings.square_max_count, widest);
        let index_buffer = StaticIndexBuffer::sprites(native.clone(), settings.square_max_count)?;

        let white_texture = device.create_texture(&TextureParameter::rgba8(1, 1), &[255; 4])?;
        let normal_texture =
            device.create_texture(&TextureParameter::rgba8(1, 1), &[127, 127, 255, 255])?;

        Ok(Self {
            native,
            host,
            settings,
            device,
            sprite_shaders,
            model_shaders,
            current_shader: None,
            current_layout: None,
            current_stride: 0,
            current_vertex_buffer: None,
            render_state: RenderStateTracker::new(),
            transient,
            index_buffer,
            standard: StandardRenderer::new(),
            white_texture,
            normal_texture,
            camera: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_projection: Mat4::IDENTITY,
            light_direction: Vec3::new(1.0, 1.0, 1.0),
            light_color: Vec4::ONE,
            light_ambient_color: Vec4::ZERO,
            uv_inversed: false,
            in_frame: false,
        })
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn device(&self) -> &GraphicsDevice {
        &self.device
    }

    pub fn native(&self) -> &Arc<dyn NativeGraphics> {
        &self.native
    }

    pub fn view_id(&self) -> ViewId {
        self.settings.view_id
    }

    /// A loader for effect textures backed by the host callbacks.
    pub fn create_texture_loader(&self) -> TextureLoader {
        TextureLoader::new(self.host.clone())
    }

    // Frame brackets

    /// Start a frame: allocate transient storage and refresh derived camera data.
    pub fn begin_rendering(&mut self) -> RendererResult<()> {
        if self.in_frame {
            log::warn!("begin_rendering called inside a frame; closing the previous one");
            self.end_rendering()?;
        }
        self.transient.begin_frame()?;
        self.in_frame = true;
        self.camera_projection = self.projection * self.camera;
        self.render_state.reset();
        self.flush_standard()
    }

    /// Finish the frame, flushing pending batches.
    pub fn end_rendering(&mut self) -> RendererResult<()> {
        if !self.in_frame {
            return Err(RendererError::FrameNotStarted);
        }
        let flushed = self.flush_standard();
        self.standard.reset();
        self.transient.end_frame();
        self.in_frame = false;
        self.current_vertex_buffer = None;
        flushed
    }

    pub fn is_rendering(&self) -> bool {
        self.in_frame
    }

    pub fn square_max_count(&self) -> u32 {
        self.settings.square_max_count
    }

    /// Resize the transient buffer and regenerate the sprite index buffer.
    pub fn set_square_max_count(&mut self, count: u32) -> RendererResult<()> {
        if count == 0 {
            return Err(RendererError::InvalidParameter(
                "square_max_count must be positive".to_string(),
            ));
        }
        if self.in_frame {
            self.flush_standard()?;
        }

        self.index_buffer = StaticIndexBuffer::sprites(self.native.clone(), count)?;
        let layout = self.transient.native_layout().clone();
        self.transient.end_frame();
        self.transient = TransientVertexBuffer::new(self.native.clone(), count, layout);
        if self.in_frame {
            self.transient.begin_frame()?;
        }
        self.settings.square_max_count = count;
        log::debug!("square_max_count set to {count}");
        Ok(())
    }

    pub fn transient_vertex_buffer(&self) -> &TransientVertexBuffer {
        &self.transient
    }

    pub fn transient_vertex_buffer_mut(&mut self) -> &mut TransientVertexBuffer {
        &mut self.transient
    }

    /// Shared quad index buffer used by sprite draws.
    pub fn index_buffer(&self) -> &Arc<StaticIndexBuffer> {
        &self.index_buffer
    }

    // Shaders

    /// Loaded sprite shader of a variant.
    pub fn shader(&self, ty: ShaderType) -> Option<&Shader> {
        self.sprite_shaders[ty.index()].as_ref()
    }

    /// Loaded model shader of a variant.
    pub fn model_shader(&self, ty: ShaderType) -> Option<&Shader> {
        self.model_shaders[ty.index()].as_ref()
    }

    pub fn shader_by_key(&self, key: ShaderKey) -> Option<&Shader> {
        match key.family {
            ShaderFamily::Sprite => self.shader(key.ty),
            ShaderFamily::Model => self.model_shader(key.ty),
        }
    }

    fn shader_by_key_mut(&mut self, key: ShaderKey) -> Option<&mut Shader> {
        let slot = match key.family {
            ShaderFamily::Sprite => &mut self.sprite_shaders[key.ty.index()],
            ShaderFamily::Model => &mut self.model_shaders[key.ty.index()],
        };
        slot.as_mut()
    }

    fn active_shader(&self) -> RendererResult<(ShaderKey, &Shader)> {
        let key = self.current_shader.ok_or(RendererError::NoActiveShader)?;
        let shader = self
            .shader_by_key(key)
            .ok_or(RendererError::ShaderNotLoaded(key.ty))?;
        Ok((key, shader))
    }

    fn active_shader_mut(&mut self) -> RendererResult<&mut Shader> {
        let key = self.current_shader.ok_or(RendererError::NoActiveShader)?;
        self.shader_by_key_mut(key)
            .ok_or(RendererError::ShaderNotLoaded(key.ty))
    }

    pub fn current_shader(&self) -> Option<ShaderKey> {
        self.current_shader
    }

    /// Make `key` the active shader. Only one shader may be active.
    pub fn begin_shader(&mut self, key: ShaderKey) -> RendererResult<()> {
        if self.current_shader.is_some() {
            return Err(RendererError::ShaderAlreadyActive);
        }
        if self.shader_by_key(key).is_none() {
            return Err(RendererError::ShaderNotLoaded(key.ty));
        }
        self.current_shader = Some(key);
        Ok(())
    }

    /// Deactivate `key`, which must be the active shader.
    pub fn end_shader(&mut self, key: ShaderKey) -> RendererResult<()> {
        if self.current_shader != Some(key) {
            return Err(RendererError::ShaderMismatch);
        }
        self.current_shader = None;
        Ok(())
    }

    /// Copy `data` into the active shader's vertex constants at `offset`.
    pub fn set_vertex_buffer_to_shader(&mut self, data: &[u8], offset: usize) -> RendererResult<()> {
        self.active_shader_mut()?.write_vertex_constants(offset, data)
    }

    /// Copy `data` into the active shader's pixel constants at `offset`.
    pub fn set_pixel_buffer_to_shader(&mut self, data: &[u8], offset: usize) -> RendererResult<()> {
        self.active_shader_mut()?.write_pixel_constants(offset, data)
    }

    /// Push the active shader's bound uniforms to the native layer.
    pub fn submit_uniforms(&self) -> RendererResult<()> {
        self.active_shader()?.1.submit_uniforms();
        Ok(())
    }

    /// Write the pixel constant block matching the active shader's variant.
    pub(crate) fn write_pixel_constants(&mut self, inputs: &PixelInputs) -> RendererResult<()> {
        let (key, shader) = self.active_shader()?;
        if !shader.pixel_constants().is_allocated() {
            return Ok(());
        }
        if key.ty.is_distortion() {
            return self.write_distortion_constants(inputs);
        }

        let light_direction = self.light_direction.normalize_or_zero();
        let front = self.camera_front_direction();
        let constants = PixelConstants {
            light_direction: light_direction.extend(0.0).to_array(),
            light_color: self.light_color.to_array(),
            light_ambient_color: self.light_ambient_color.to_array(),
            flipbook_param: inputs.flipbook_parameter,
            camera_front_direction: front.extend(0.0).to_array(),
            emissive_param: [inputs.emissive_scaling, 0.0, 0.0, 0.0],
            uv_inversed_back: self.uv_inversed(),
            ..Default::default()
        };
        debug_assert_eq!(size_of::<PixelConstants>(), shader.pixel_constants().len());
        self.set_pixel_buffer_to_shader(bytemuck::bytes_of(&constants), 0)
    }

    #[cfg(feature = "distortion")]
    fn write_distortion_constants(&mut self, inputs: &PixelInputs) -> RendererResult<()> {
        use crate::constants::PixelConstantsDistortion;

        let constants = PixelConstantsDistortion {
            distortion_intensity: [inputs.distortion_intensity, 0.0, 0.0, 0.0],
            uv_inversed_back: self.uv_inversed(),
            flipbook_param: inputs.flipbook_parameter,
            ..Default::default()
        };
        self.set_pixel_buffer_to_shader(bytemuck::bytes_of(&constants), 0)
    }

    #[cfg(not(feature = "distortion"))]
    fn write_distortion_constants(&mut self, _inputs: &PixelInputs) -> RendererResult<()> {
        Ok(())
    }

    // Render state

    /// Pending render state, applied by [`Self::update_render_state`].
    pub fn render_state_mut(&mut self) -> &mut RenderState {
        self.render_state.next_mut()
    }

    pub fn render_state(&self) -> &RenderStateTracker {
        &self.render_state
    }

    pub fn render_mode(&self) -> RenderMode {
        self.settings.render_mode
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.settings.render_mode = mode;
    }

    /// Apply the pending render state.
    pub fn update_render_state(&mut self, forced: bool) {
        self.render_state
            .update(forced, self.settings.render_mode, self.native.as_ref());
    }

    /// Reset the pending state to defaults and apply it.
    pub fn reset_render_state(&mut self) {
        self.render_state.reset();
        self.update_render_state(true);
    }

    /// Bind textures to the active shader's sampler slots.
    ///
    /// Empty slots get a proxy texture: flat normal for the normal slot of
    /// lit variants, white otherwise. Slots without a bound sampler are
    /// skipped.
    pub fn set_textures(&self, textures: &[Option<Arc<Texture>>]) -> RendererResult<()> {
        let (key, shader) = self.active_shader()?;
        let state = self.render_state.next();
        for (slot, texture) in textures.iter().enumerate().take(MAX_SAMPLERS) {
            let Some(sampler) = shader.sampler(slot) else {
                continue;
            };
            let handle = match texture {
                Some(texture) => texture.handle(),
                None if slot == NORMAL_TEXTURE_SLOT && key.ty.is_lit() => {
                    self.normal_texture.handle()
                }
                None => self.white_texture.handle(),
            };
            self.native
                .set_texture(slot as u8, sampler, handle, state.sampler_flags(slot));
        }
        Ok(())
    }

    // Geometry

    /// Use a static vertex buffer for the next [`Self::draw_polygon`].
    pub fn set_vertex_buffer(&mut self, buffer: &StaticVertexBuffer) {
        self.current_vertex_buffer = Some(buffer.handle());
    }

    /// Bind a static index buffer for the next polygon draw.
    pub fn set_index_buffer(&self, buffer: &StaticIndexBuffer) -> RendererResult<()> {
        let count = u32::try_from(buffer.count()).map_err(|_| {
            RendererError::InvalidParameter(format!("{} indices", buffer.count()))
        })?;
        self.native.set_index_buffer(buffer.handle(), 0, count);
        Ok(())
    }

    /// Use the vertex layout of `key` for the next draw.
    pub fn set_layout(&mut self, key: ShaderKey) -> RendererResult<()> {
        let shader = self
            .shader_by_key(key)
            .ok_or(RendererError::ShaderNotLoaded(key.ty))?;
        self.current_layout = shader.layout();
        self.current_stride = key.vertex_layout().stride();
        Ok(())
    }

    /// Program and layout of the active shader, or `None` if it's inert.
    fn draw_target(&self) -> RendererResult<Option<(ProgramHandle, VertexLayoutHandle)>> {
        let (_, shader) = self.active_shader()?;
        match (shader.program(), self.current_layout) {
            (Some(program), Some(layout)) => Ok(Some((program, layout))),
            _ => {
                log::warn!("Skipping draw with disabled shader {}", shader.name());
                Ok(None)
            }
        }
    }

    /// Draw `sprite_count` quads from the transient buffer.
    ///
    /// `vertex_offset` is in vertices of the current layout. Fails with
    /// [`RendererError::InvalidParameter`] when the quads run past the sprite
    /// index buffer or the vertices past the frame's transient storage.
    pub fn draw_sprites(&mut self, sprite_count: u32, vertex_offset: u32) -> RendererResult<()> {
        let Some(buffer) = self.transient.handle() else {
            return Err(RendererError::FrameNotStarted);
        };
        let Some((program, layout)) = self.draw_target()? else {
            return Ok(());
        };
        let (num_vertices, num_indices) = self.check_sprite_range(sprite_count, vertex_offset)?;
        log::trace!("draw_sprites count={sprite_count} offset={vertex_offset}");
        self.native
            .set_transient_vertex_buffer(0, buffer, vertex_offset, num_vertices, layout);
        self.native
            .set_index_buffer(self.index_buffer.handle(), 0, num_indices);
        self.native.submit(self.settings.view_id, program);
        Ok(())
    }

    /// Vertex and index counts of a sprite draw that fits both buffers.
    fn check_sprite_range(&self, sprite_count: u32, vertex_offset: u32) -> RendererResult<(u32, u32)> {
        let (Some(num_vertices), Some(num_indices)) =
            (sprite_count.checked_mul(4), sprite_count.checked_mul(6))
        else {
            return Err(RendererError::InvalidParameter(format!(
                "sprite count {sprite_count} overflows"
            )));
        };

        let index_capacity = self.index_buffer.count();
        if num_indices as usize > index_capacity {
            return Err(RendererError::InvalidParameter(format!(
                "{sprite_count} sprites exceed the index buffer of {} quads",
                index_capacity / 6
            )));
        }

        let end = u64::from(vertex_offset) + u64::from(num_vertices);
        let capacity = self.transient.capacity() as u64;
        if end * u64::from(self.current_stride) > capacity {
            return Err(RendererError::InvalidParameter(format!(
                "vertices {vertex_offset}..{end} exceed the transient buffer of {capacity} bytes"
            )));
        }
        Ok((num_vertices, num_indices))
    }

    /// Draw from the static vertex and index buffers set earlier.
    pub fn draw_polygon(&mut self, vertex_count: u32, index_count: u32) -> RendererResult<()> {
        self.draw_polygon_impl(vertex_count, index_count, None)
    }

    /// Not supported by this backend.
    pub fn draw_polygon_instanced(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        instance_count: u32,
    ) -> RendererResult<()> {
        log::error!(
            "draw_polygon_instanced({vertex_count}, {index_count}, {instance_count}) is not supported"
        );
        Err(RendererError::Unsupported("draw_polygon_instanced"))
    }

    /// Model batches: one submission covering `instances` constant-indexed instances.
    pub(crate) fn draw_model_instances(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        instances: u32,
    ) -> RendererResult<()> {
        self.draw_polygon_impl(vertex_count, index_count, Some(instances))
    }

    fn draw_polygon_impl(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        instances: Option<u32>,
    ) -> RendererResult<()> {
        let buffer = self.current_vertex_buffer.ok_or_else(|| {
            RendererError::InvalidParameter("no vertex buffer bound".to_string())
        })?;
        let Some((program, layout)) = self.draw_target()? else {
            return Ok(());
        };
        log::trace!("draw_polygon vertices={vertex_count} indices={index_count}");
        self.native
            .set_vertex_buffer(0, buffer, 0, vertex_count, layout);
        if let Some(count) = instances {
            self.native.set_instance_count(count);
        }
        self.native.submit(self.settings.view_id, program);
        Ok(())
    }

    // Camera and lighting

    pub fn camera_matrix(&self) -> Mat4 {
        self.camera
    }

    pub fn set_camera_matrix(&mut self, camera: Mat4) {
        self.camera = camera;
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Projection x camera, refreshed by [`Self::begin_rendering`].
    pub fn camera_projection_matrix(&self) -> Mat4 {
        self.camera_projection
    }

    /// World-space direction the camera looks along (view-space +Z).
    pub fn camera_front_direction(&self) -> Vec3 {
        self.camera.row(2).truncate().normalize_or_zero()
    }

    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }

    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.light_direction = direction;
    }

    pub fn light_color(&self) -> Vec4 {
        self.light_color
    }

    pub fn set_light_color(&mut self, color: Vec4) {
        self.light_color = color;
    }

    pub fn light_ambient_color(&self) -> Vec4 {
        self.light_ambient_color
    }

    pub fn set_light_ambient_color(&mut self, color: Vec4) {
        self.light_ambient_color = color;
    }

    /// Flip texture V for backends with a bottom-left texture origin.
    pub fn set_uv_inversed(&mut self, inversed: bool) {
        self.uv_inversed = inversed;
    }

    pub(crate) fn uv_inversed(&self) -> [f32; 4] {
        if self.uv_inversed {
            [1.0, -1.0, 0.0, 0.0]
        } else {
            [0.0, 1.0, 0.0, 0.0]
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("device", &self.device)
            .field("settings", &self.settings)
            .field("current_shader", &self.current_shader)
            .field("transient", &self.transient)
            .field("index_buffer", &self.index_buffer)
            .field("in_frame", &self.in_frame)
            .finish_non_exhaustive()
    }
}
