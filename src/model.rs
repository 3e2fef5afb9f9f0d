//! Model geometry and the instanced model pipeline.
//!
//! A [`Model`] keeps its geometry on the CPU until the first draw, then
//! uploads it once into static buffers shared by every later draw. The
//! [`ModelRenderer`] collects the instances of a node and draws them in
//! batches of up to [`MAX_INSTANCED`], with per-instance transforms and
//! colors staged into the model shader's vertex constants.
//!
//! Distortion models are skipped unless the `distortion` feature is enabled.

use std::sync::{Arc, OnceLock};

use glam::{Mat4, Vec4};

use crate::backend::IndexStride;
use crate::buffers::{encode_indices, StaticIndexBuffer, StaticVertexBuffer};
use crate::constants::{ModelAdvancedVertexConstants, ModelVertexConstants, MAX_INSTANCED};
use crate::device::GraphicsDevice;
use crate::error::{RendererError, RendererResult};
use crate::primitives::{NodeParameter, PrimitiveRenderer};
use crate::renderer::{PixelInputs, Renderer, ShaderKey};
use crate::vertex::ModelVertex;

/// GPU copy of a model.
#[derive(Debug, Clone)]
struct ModelBuffers {
    vertex_buffer: Arc<StaticVertexBuffer>,
    index_buffer: Arc<StaticIndexBuffer>,
}

/// Triangle mesh with lazily uploaded GPU buffers.
#[derive(Debug)]
pub struct Model {
    vertices: Vec<ModelVertex>,
    faces: Vec<[u32; 3]>,
    gpu: OnceLock<ModelBuffers>,
}

impl Model {
    pub fn new(vertices: Vec<ModelVertex>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            faces,
            gpu: OnceLock::new(),
        }
    }

    pub fn vertices(&self) -> &[ModelVertex] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn vertex_count(&self) -> RendererResult<u32> {
        u32::try_from(self.vertices.len()).map_err(|_| {
            RendererError::InvalidParameter(format!(
                "model has {} vertices, more than a draw can address",
                self.vertices.len()
            ))
        })
    }

    pub fn index_count(&self) -> RendererResult<u32> {
        u32::try_from(self.faces.len())
            .ok()
            .and_then(|faces| faces.checked_mul(3))
            .ok_or_else(|| {
                RendererError::InvalidParameter(format!(
                    "model has {} faces, more than a draw can address",
                    self.faces.len()
                ))
            })
    }

    pub fn is_on_gpu(&self) -> bool {
        self.gpu.get().is_some()
    }

    /// Upload the geometry if it isn't resident yet.
    ///
    /// A failed upload leaves the model on the CPU and a later call retries.
    pub fn store_to_gpu(&self, device: &GraphicsDevice) -> RendererResult<()> {
        if self.is_on_gpu() {
            return Ok(());
        }
        let buffers = self.upload(device)?;
        if self.gpu.set(buffers).is_err() {
            // Another caller uploaded first; its buffers stay and ours drop.
            log::trace!("Model geometry was uploaded concurrently");
        }
        Ok(())
    }

    fn upload(&self, device: &GraphicsDevice) -> RendererResult<ModelBuffers> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(RendererError::InvalidParameter("empty model".to_string()));
        }
        self.vertex_count()?;
        self.index_count()?;
        let vertex_buffer =
            device.create_vertex_buffer(bytemuck::cast_slice(&self.vertices), false)?;

        let stride = if self.vertices.len() > u16::MAX as usize {
            IndexStride::U32
        } else {
            IndexStride::U16
        };
        let indices: Vec<u32> = self.faces.iter().flatten().copied().collect();
        let data = encode_indices(&indices, stride)?;
        let index_buffer = device.create_index_buffer(indices.len(), &data, stride)?;

        log::debug!(
            "Uploaded model: {} vertices, {} indices",
            self.vertices.len(),
            indices.len()
        );
        Ok(ModelBuffers {
            vertex_buffer,
            index_buffer,
        })
    }

    fn buffers(&self) -> Option<&ModelBuffers> {
        self.gpu.get()
    }
}

/// Node parameters of a model draw.
#[derive(Debug, Clone)]
pub struct ModelParameter {
    pub node: NodeParameter,
    pub model: Arc<Model>,
}

/// Per-instance model data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInstance {
    pub transform: Mat4,
    /// Texture rectangle: x, y, width, height.
    pub uv: [f32; 4],
    pub color: Vec4,
    pub alpha_uv: [f32; 4],
    pub uv_distortion_uv: [f32; 4],
    pub blend_uv: [f32; 4],
    pub blend_alpha_uv: [f32; 4],
    pub blend_uv_distortion_uv: [f32; 4],
    pub flipbook_index_and_next_rate: f32,
    pub alpha_threshold: f32,
}

impl Default for ModelInstance {
    fn default() -> Self {
        let full = [0.0, 0.0, 1.0, 1.0];
        Self {
            transform: Mat4::IDENTITY,
            uv: full,
            color: Vec4::ONE,
            alpha_uv: full,
            uv_distortion_uv: full,
            blend_uv: full,
            blend_alpha_uv: full,
            blend_uv_distortion_uv: full,
            flipbook_index_and_next_rate: 0.0,
            alpha_threshold: 0.0,
        }
    }
}

/// Draws model instances in constant-indexed batches.
#[derive(Debug, Default)]
pub struct ModelRenderer {
    instances: Vec<ModelInstance>,
}

impl ModelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn draw_batch(
        renderer: &mut Renderer,
        key: ShaderKey,
        params: &ModelParameter,
        buffers: &ModelBuffers,
        batch: &[ModelInstance],
    ) -> RendererResult<()> {
        let light_direction = renderer.light_direction().normalize_or_zero().extend(0.0);
        if key.ty.is_advanced() {
            let mut constants = ModelAdvancedVertexConstants {
                camera: renderer.camera_projection_matrix(),
                model_flipbook_parameter: params.node.flipbook_parameter,
                light_direction: light_direction.to_array(),
                light_color: renderer.light_color().to_array(),
                light_ambient_color: renderer.light_ambient_color().to_array(),
                uv_inversed: renderer.uv_inversed(),
                ..Default::default()
            };
            for (i, instance) in batch.iter().enumerate() {
                constants.model[i] = instance.transform;
                constants.model_uv[i] = instance.uv;
                constants.model_alpha_uv[i] = instance.alpha_uv;
                constants.model_uv_distortion_uv[i] = instance.uv_distortion_uv;
                constants.model_blend_uv[i] = instance.blend_uv;
                constants.model_blend_alpha_uv[i] = instance.blend_alpha_uv;
                constants.model_blend_uv_distortion_uv[i] = instance.blend_uv_distortion_uv;
                constants.model_flipbook_index_and_next_rate[i] =
                    [instance.flipbook_index_and_next_rate, 0.0, 0.0, 0.0];
                constants.model_alpha_threshold[i] = [instance.alpha_threshold, 0.0, 0.0, 0.0];
                constants.model_color[i] = instance.color.to_array();
            }
            renderer.set_vertex_buffer_to_shader(bytemuck::bytes_of(&constants), 0)?;
        } else {
            let mut constants = ModelVertexConstants {
                camera: renderer.camera_projection_matrix(),
                light_direction: light_direction.to_array(),
                light_color: renderer.light_color().to_array(),
                light_ambient_color: renderer.light_ambient_color().to_array(),
                uv_inversed: renderer.uv_inversed(),
                ..Default::default()
            };
            for (i, instance) in batch.iter().enumerate() {
                constants.model[i] = instance.transform;
                constants.model_uv[i] = instance.uv;
                constants.model_color[i] = instance.color.to_array();
            }
            renderer.set_vertex_buffer_to_shader(bytemuck::bytes_of(&constants), 0)?;
        }

        renderer.write_pixel_constants(&PixelInputs {
            flipbook_parameter: params.node.flipbook_parameter,
            distortion_intensity: params.node.distortion_intensity,
            emissive_scaling: params.node.emissive_scaling,
        })?;
        renderer.submit_uniforms()?;

        *renderer.render_state_mut() = params.node.render_state;
        renderer.update_render_state(false);
        renderer.set_textures(&params.node.textures())?;
        renderer.set_layout(key)?;
        renderer.set_vertex_buffer(&buffers.vertex_buffer);
        renderer.set_index_buffer(&buffers.index_buffer)?;
        let instances = u32::try_from(batch.len()).map_err(|_| {
            RendererError::InvalidParameter(format!("{} model instances", batch.len()))
        })?;
        renderer.draw_model_instances(
            params.model.vertex_count()?,
            params.model.index_count()?,
            instances,
        )
    }
}

impl PrimitiveRenderer for ModelRenderer {
    type Params = ModelParameter;
    type Instance = ModelInstance;

    fn begin_rendering(
        &mut self,
        renderer: &mut Renderer,
        _params: &ModelParameter,
        count: usize,
    ) -> RendererResult<()> {
        // Sprites queued so far must land before the models.
        renderer.flush_standard()?;
        self.instances.clear();
        self.instances.reserve(count);
        Ok(())
    }

    fn rendering(
        &mut self,
        _renderer: &mut Renderer,
        _params: &ModelParameter,
        instance: &ModelInstance,
    ) -> RendererResult<()> {
        self.instances.push(*instance);
        Ok(())
    }

    fn end_rendering(&mut self, renderer: &mut Renderer, params: &ModelParameter) -> RendererResult<()> {
        let instances = std::mem::take(&mut self.instances);
        if instances.is_empty() {
            return Ok(());
        }

        let ty = params.node.shader_type();
        if ty.is_distortion() && !cfg!(feature = "distortion") {
            log::debug!("Distortion is disabled, skipping {} models", instances.len());
            return Ok(());
        }
        let key = ShaderKey::model(ty);
        let shader = renderer
            .model_shader(ty)
            .ok_or(RendererError::ShaderNotLoaded(ty))?;
        if !shader.is_valid() {
            log::warn!("Skipping models with disabled shader {}", shader.name());
            return Ok(());
        }

        if let Err(e) = params.model.store_to_gpu(renderer.device()) {
            log::warn!("Skipping {} models, geometry upload failed: {e}", instances.len());
            return Ok(());
        }
        let Some(buffers) = params.model.buffers().cloned() else {
            return Ok(());
        };

        for batch in instances.chunks(MAX_INSTANCED) {
            renderer.begin_shader(key)?;
            let drawn = Self::draw_batch(renderer, key, params, &buffers, batch);
            let ended = renderer.end_shader(key);
            drawn.and(ended)?;
        }
        Ok(())
    }
}
