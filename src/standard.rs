//! Sprite batching.
//!
//! Primitive renderers hand their quads to [`Renderer::stage_vertices`]
//! together with a [`StandardState`]. Consecutive quads with an equal state
//! are merged into one batch; the batch is drawn when the state changes, when
//! the transient buffer can't take more, before a model draw and at the end
//! of the frame.

use std::sync::Arc;

use crate::constants::StandardVertexConstants;
use crate::error::{RendererError, RendererResult};
use crate::render_state::RenderState;
use crate::renderer::{PixelInputs, Renderer, ShaderKey};
use crate::shader::ShaderType;
use crate::texture::Texture;
use crate::vertex::PrimitiveVertex;

/// Texture slots a sprite batch binds: color, then normal or distortion.
pub const MAX_STANDARD_TEXTURES: usize = 2;

/// Everything that has to match for two quads to share a draw.
#[derive(Debug, Clone)]
pub struct StandardState {
    pub shader: ShaderType,
    pub render_state: RenderState,
    pub textures: [Option<Arc<Texture>>; MAX_STANDARD_TEXTURES],
    pub flipbook_parameter: [f32; 4],
    pub distortion_intensity: f32,
    pub emissive_scaling: f32,
}

impl Default for StandardState {
    fn default() -> Self {
        Self {
            shader: ShaderType::Unlit,
            render_state: RenderState::default(),
            textures: [None, None],
            flipbook_parameter: [0.0; 4],
            distortion_intensity: 0.0,
            emissive_scaling: 1.0,
        }
    }
}

impl PartialEq for StandardState {
    fn eq(&self, other: &Self) -> bool {
        let same_textures = self
            .textures
            .iter()
            .zip(&other.textures)
            .all(|(a, b)| a.as_ref().map(|t| t.handle()) == b.as_ref().map(|t| t.handle()));
        self.shader == other.shader
            && self.render_state == other.render_state
            && same_textures
            && self.flipbook_parameter == other.flipbook_parameter
            && self.distortion_intensity == other.distortion_intensity
            && self.emissive_scaling == other.emissive_scaling
    }
}

/// Quads waiting for a draw.
#[derive(Debug)]
pub(crate) struct Batch {
    state: StandardState,
    data: Vec<u8>,
    vertex_count: u32,
}

/// Accumulates quads with the same [`StandardState`].
#[derive(Debug, Default)]
pub struct StandardRenderer {
    state: Option<StandardState>,
    data: Vec<u8>,
    vertex_count: u32,
}

impl StandardRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the current batch.
    pub fn state(&self) -> Option<&StandardState> {
        self.state.as_ref()
    }

    /// Vertices waiting for a draw.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn pending_bytes(&self) -> usize {
        self.data.len()
    }

    /// Switch to `state`, returning the previous batch if it has to be drawn first.
    pub(crate) fn update_state(&mut self, state: &StandardState) -> Option<Batch> {
        if self.state.as_ref() == Some(state) {
            return None;
        }
        let previous = self.take();
        self.state = Some(state.clone());
        previous
    }

    /// Encode `vertices`, `count` of them, for `ty`. The caller checked they fit.
    pub(crate) fn append(&mut self, ty: ShaderType, vertices: &[PrimitiveVertex], count: u32) {
        let stride = PrimitiveVertex::stride(ty);
        let start = self.data.len();
        self.data.resize(start + vertices.len() * stride, 0);
        for (vertex, out) in vertices
            .iter()
            .zip(self.data[start..].chunks_exact_mut(stride))
        {
            vertex.write(ty, out);
        }
        self.vertex_count += count;
    }

    /// Take the pending batch, keeping the current state.
    pub(crate) fn take(&mut self) -> Option<Batch> {
        if self.vertex_count == 0 {
            return None;
        }
        let state = self.state.clone()?;
        let vertex_count = std::mem::take(&mut self.vertex_count);
        Some(Batch {
            state,
            data: std::mem::take(&mut self.data),
            vertex_count,
        })
    }

    /// Forget the current state and drop pending quads.
    pub(crate) fn reset(&mut self) {
        self.state = None;
        self.data.clear();
        self.vertex_count = 0;
    }
}

impl Renderer {
    /// Queue quads for drawing with `state`.
    ///
    /// `vertices` holds four vertices per quad, ordered bottom-left,
    /// bottom-right, top-left, top-right.
    ///
    /// # Errors
    ///
    /// Fails outside a frame, when the shader variant isn't loaded, or when
    /// the quads don't fit into what's left of the transient buffer.
    pub fn stage_vertices(
        &mut self,
        state: &StandardState,
        vertices: &[PrimitiveVertex],
    ) -> RendererResult<()> {
        if !self.is_rendering() {
            return Err(RendererError::FrameNotStarted);
        }
        if vertices.len() % 4 != 0 {
            return Err(RendererError::InvalidParameter(format!(
                "{} vertices is not a whole number of quads",
                vertices.len()
            )));
        }
        if vertices.is_empty() {
            return Ok(());
        }
        let count = u32::try_from(vertices.len()).map_err(|_| {
            RendererError::InvalidParameter(format!("{} vertices", vertices.len()))
        })?;

        let ty = state.shader;
        if ty.is_distortion() && !cfg!(feature = "distortion") {
            log::debug!("Distortion is disabled, dropping {} vertices", vertices.len());
            return Ok(());
        }
        if self.shader(ty).is_none() {
            return Err(RendererError::ShaderNotLoaded(ty));
        }

        if let Some(batch) = self.standard.update_state(state) {
            self.render_batch(batch)?;
        }

        let stride = PrimitiveVertex::stride(ty);
        let requested = vertices.len().saturating_mul(stride);
        // One stride of slack for the alignment of the batch's region.
        let fits = |renderer: &Self| {
            renderer
                .standard
                .pending_bytes()
                .saturating_add(requested)
                .saturating_add(stride)
                <= renderer.transient_vertex_buffer().remaining()
        };
        if !fits(self) {
            self.flush_standard()?;
            if !fits(self) {
                return Err(RendererError::TransientBufferFull {
                    requested,
                    remaining: self.transient_vertex_buffer().remaining(),
                });
            }
        }

        self.standard.append(ty, vertices, count);
        Ok(())
    }

    /// Draw pending quads, if any.
    pub fn flush_standard(&mut self) -> RendererResult<()> {
        match self.standard.take() {
            Some(batch) => self.render_batch(batch),
            None => Ok(()),
        }
    }

    fn render_batch(&mut self, batch: Batch) -> RendererResult<()> {
        let ty = batch.state.shader;
        let stride = PrimitiveVertex::stride(ty);
        let transient = self.transient_vertex_buffer_mut();
        let (offset, region) = transient.ring_buffer_lock(batch.data.len(), stride)?;
        region.copy_from_slice(&batch.data);
        transient.unlock()?;

        log::trace!(
            "Drawing {} sprites with {:?} at offset {offset}",
            batch.vertex_count / 4,
            ty
        );

        let vertex_offset = u32::try_from(offset / stride).map_err(|_| {
            RendererError::InvalidParameter(format!("transient offset {offset}"))
        })?;
        let key = ShaderKey::sprite(ty);
        self.begin_shader(key)?;
        let drawn = self.draw_batch(key, &batch, vertex_offset);
        let ended = self.end_shader(key);
        drawn.and(ended)
    }

    fn draw_batch(&mut self, key: ShaderKey, batch: &Batch, vertex_offset: u32) -> RendererResult<()> {
        let state = &batch.state;
        let constants = StandardVertexConstants {
            camera: self.camera_matrix(),
            camera_proj: self.camera_projection_matrix(),
            uv_inversed: self.uv_inversed(),
            flipbook_parameter: state.flipbook_parameter,
        };
        self.set_vertex_buffer_to_shader(bytemuck::bytes_of(&constants), 0)?;
        self.write_pixel_constants(&PixelInputs {
            flipbook_parameter: state.flipbook_parameter,
            distortion_intensity: state.distortion_intensity,
            emissive_scaling: state.emissive_scaling,
        })?;
        self.submit_uniforms()?;

        *self.render_state_mut() = state.render_state;
        self.update_render_state(false);
        self.set_textures(&state.textures)?;
        self.set_layout(key)?;
        self.draw_sprites(batch.vertex_count / 4, vertex_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{CatalogHost, NativeCall, RecordingGraphics};
    use crate::config::{InitArgs, RendererSettings};
    use crate::render_state::AlphaBlendType;
    use glam::Vec3;

    fn renderer() -> (Arc<RecordingGraphics>, Renderer) {
        let native = Arc::new(RecordingGraphics::new());
        let host = Arc::new(CatalogHost::with_standard_shaders(native.clone()));
        let settings = RendererSettings::default()
            .with_square_max_count(64)
            .with_all_sprite_shaders();
        let renderer =
            Renderer::new(InitArgs::new(native.clone(), host).with_settings(settings)).unwrap();
        (native, renderer)
    }

    fn quad(z: f32) -> [PrimitiveVertex; 4] {
        [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)].map(|(x, y)| PrimitiveVertex {
            pos: Vec3::new(x, y, z),
            ..Default::default()
        })
    }

    fn submits(native: &RecordingGraphics) -> Vec<NativeCall> {
        native
            .calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    NativeCall::SetTransientVertexBuffer { .. } | NativeCall::Submit { .. }
                )
            })
            .collect()
    }

    #[test]
    fn test_equal_states_share_a_draw() {
        let (native, mut renderer) = renderer();
        renderer.begin_rendering().unwrap();
        let state = StandardState::default();

        renderer.stage_vertices(&state, &quad(0.0)).unwrap();
        renderer.stage_vertices(&state, &quad(1.0)).unwrap();
        assert_eq!(renderer.standard.vertex_count(), 8);
        assert_eq!(native.submit_count(), 0);

        renderer.end_rendering().unwrap();
        assert_eq!(native.submit_count(), 1);
        assert!(matches!(
            submits(&native)[0],
            NativeCall::SetTransientVertexBuffer {
                start_vertex: 0,
                num_vertices: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_state_change_flushes() {
        let (native, mut renderer) = renderer();
        renderer.begin_rendering().unwrap();
        let first = StandardState::default();
        let mut second = StandardState::default();
        second.render_state.alpha_blend = AlphaBlendType::Add;

        renderer.stage_vertices(&first, &quad(0.0)).unwrap();
        renderer.stage_vertices(&second, &quad(0.0)).unwrap();
        assert_eq!(native.submit_count(), 1);
        renderer.end_rendering().unwrap();
        assert_eq!(native.submit_count(), 2);

        // The second batch starts after the first one in the ring.
        let calls = submits(&native);
        assert!(matches!(
            calls[2],
            NativeCall::SetTransientVertexBuffer { start_vertex: 4, .. }
        ));
    }

    #[test]
    fn test_batches_of_different_strides_are_aligned() {
        let (native, mut renderer) = renderer();
        renderer.begin_rendering().unwrap();
        let unlit = StandardState::default();
        let lit = StandardState {
            shader: ShaderType::Lit,
            ..Default::default()
        };

        renderer.stage_vertices(&unlit, &quad(0.0)).unwrap();
        renderer.stage_vertices(&lit, &quad(0.0)).unwrap();
        renderer.end_rendering().unwrap();

        // 4 * 24 bytes rounded up to the 40 byte stride is 120 bytes.
        let calls = submits(&native);
        assert!(matches!(
            calls[2],
            NativeCall::SetTransientVertexBuffer { start_vertex: 3, .. }
        ));
    }

    #[test]
    fn test_staging_requires_frame_and_whole_quads() {
        let (_, mut renderer) = renderer();
        let state = StandardState::default();
        assert_eq!(
            renderer.stage_vertices(&state, &quad(0.0)),
            Err(RendererError::FrameNotStarted)
        );

        renderer.begin_rendering().unwrap();
        assert!(matches!(
            renderer.stage_vertices(&state, &quad(0.0)[..3]),
            Err(RendererError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_full_transient_buffer_is_reported() {
        let (_, mut renderer) = renderer();
        renderer.begin_rendering().unwrap();
        let state = StandardState::default();
        // 64 * 88 bytes can't hold 240 unlit vertices.
        let vertices = vec![PrimitiveVertex::default(); 240];
        assert!(matches!(
            renderer.stage_vertices(&state, &vertices),
            Err(RendererError::TransientBufferFull { .. })
        ));
    }

    #[cfg(not(feature = "distortion"))]
    #[test]
    fn test_distortion_is_skipped_without_feature() {
        let (native, mut renderer) = renderer();
        renderer.begin_rendering().unwrap();
        let state = StandardState {
            shader: ShaderType::BackDistortion,
            ..Default::default()
        };
        renderer.stage_vertices(&state, &quad(0.0)).unwrap();
        renderer.end_rendering().unwrap();
        assert_eq!(native.submit_count(), 0);
    }
}
