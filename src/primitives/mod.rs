//! Primitive renderers.
//!
//! Each primitive kind implements [`PrimitiveRenderer`], the three-step
//! protocol the host drives per node:
//! `begin_rendering(params, count)`, `rendering(params, instance)` once per
//! instance, then `end_rendering(params)`. Sprites, ribbons, rings and tracks
//! turn their instances into quads and hand them to the standard batcher;
//! models draw through their own pipeline in [`crate::model`].
//!
//! Ribbons and tracks share [`StripRenderer`]: the instances of a node form
//! a path, and each instance kind only says how a cross-section of the path
//! looks through [`StripInstance`].

mod ribbon;
mod ring;
mod sprite;
mod track;

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

pub use ribbon::{RibbonInstance, RibbonRenderer};
pub use ring::{RingInstance, RingRenderer};
pub use sprite::{Billboard, SpriteInstance, SpriteRenderer};
pub use track::{TrackInstance, TrackRenderer};

use crate::error::RendererResult;
use crate::render_state::RenderState;
use crate::renderer::Renderer;
use crate::shader::ShaderType;
use crate::standard::StandardState;
use crate::texture::Texture;
use crate::vertex::PrimitiveVertex;

/// Per-kind draw protocol driven by the host.
pub trait PrimitiveRenderer {
    /// Node-wide parameters shared by all instances of one call.
    type Params;
    /// Per-instance data.
    type Instance;

    fn begin_rendering(
        &mut self,
        renderer: &mut Renderer,
        params: &Self::Params,
        count: usize,
    ) -> RendererResult<()>;

    fn rendering(
        &mut self,
        renderer: &mut Renderer,
        params: &Self::Params,
        instance: &Self::Instance,
    ) -> RendererResult<()>;

    fn end_rendering(&mut self, renderer: &mut Renderer, params: &Self::Params)
        -> RendererResult<()>;
}

/// Material and state of one effect node.
#[derive(Debug, Clone)]
pub struct NodeParameter {
    pub advanced: bool,
    pub lit: bool,
    pub distortion: bool,
    pub render_state: RenderState,
    pub color_texture: Option<Arc<Texture>>,
    /// Normal map for lit nodes, distortion map for distortion nodes.
    pub secondary_texture: Option<Arc<Texture>>,
    pub flipbook_parameter: [f32; 4],
    pub distortion_intensity: f32,
    pub emissive_scaling: f32,
}

impl Default for NodeParameter {
    fn default() -> Self {
        Self {
            advanced: false,
            lit: false,
            distortion: false,
            render_state: RenderState::default(),
            color_texture: None,
            secondary_texture: None,
            flipbook_parameter: [0.0; 4],
            distortion_intensity: 1.0,
            emissive_scaling: 1.0,
        }
    }
}

impl NodeParameter {
    pub fn shader_type(&self) -> ShaderType {
        ShaderType::select(self.advanced, self.lit, self.distortion)
    }

    pub fn textures(&self) -> [Option<Arc<Texture>>; 2] {
        [self.color_texture.clone(), self.secondary_texture.clone()]
    }

    /// Batch key for quads of this node.
    pub fn standard_state(&self) -> StandardState {
        StandardState {
            shader: self.shader_type(),
            render_state: self.render_state,
            textures: self.textures(),
            flipbook_parameter: self.flipbook_parameter,
            distortion_intensity: self.distortion_intensity,
            emissive_scaling: self.emissive_scaling,
        }
    }
}

/// One cross-section of a strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripPoint {
    pub left: Vec3,
    pub right: Vec3,
    pub left_color: [u8; 4],
    pub right_color: [u8; 4],
    /// Texture U at the left and right edge.
    pub u: (f32, f32),
    /// Texture V along the strip.
    pub v: f32,
}

/// Instance of a strip primitive.
pub trait StripInstance: Copy {
    /// Strips laid side by side along the path.
    const LANES: usize;

    fn position(&self) -> Vec3;

    fn width(&self) -> f32;

    /// Cross-section of `lane`. `half` points from the center to the right
    /// edge of the full width.
    fn cross_section(&self, lane: usize, half: Vec3, v: f32) -> StripPoint;
}

/// Direction across the strip at point `i`, perpendicular to the path and the view.
fn side_direction(positions: &[Vec3], i: usize, front: Vec3) -> Vec3 {
    let prev = positions[i.saturating_sub(1)];
    let next = positions[(i + 1).min(positions.len() - 1)];
    let side = (next - prev).cross(front).normalize_or_zero();
    if side == Vec3::ZERO {
        Vec3::X
    } else {
        side
    }
}

/// Emit one quad per pair of consecutive points.
fn strip_quads(points: &[StripPoint], out: &mut Vec<PrimitiveVertex>) {
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let across = (a.right - a.left).normalize_or_zero();
        let along = ((b.left + b.right) - (a.left + a.right)).normalize_or_zero();
        let normal = across.cross(along).normalize_or_zero();

        let corner = |pos: Vec3, color: [u8; 4], u: f32, v: f32| PrimitiveVertex {
            pos,
            color,
            uv: Vec2::new(u, v),
            normal,
            tangent: across,
        };
        out.extend([
            corner(a.left, a.left_color, a.u.0, a.v),
            corner(a.right, a.right_color, a.u.1, a.v),
            corner(b.left, b.left_color, b.u.0, b.v),
            corner(b.right, b.right_color, b.u.1, b.v),
        ]);
    }
}

/// Quads of the camera-facing strip through `instances`, segment by segment
/// and lane by lane within a segment.
pub(crate) fn build_strip<I: StripInstance>(instances: &[I], front: Vec3) -> Vec<PrimitiveVertex> {
    if instances.len() < 2 {
        return Vec::new();
    }
    let positions: Vec<Vec3> = instances.iter().map(I::position).collect();
    let last = (instances.len() - 1) as f32;

    let mut lanes = vec![Vec::with_capacity(instances.len()); I::LANES];
    for (i, instance) in instances.iter().enumerate() {
        let half = side_direction(&positions, i, front) * instance.width() * 0.5;
        let v = i as f32 / last;
        for (lane, points) in lanes.iter_mut().enumerate() {
            points.push(instance.cross_section(lane, half, v));
        }
    }

    let mut vertices = Vec::with_capacity((instances.len() - 1) * 4 * I::LANES);
    for segment in 0..instances.len() - 1 {
        for points in &lanes {
            strip_quads(&points[segment..segment + 2], &mut vertices);
        }
    }
    vertices
}

/// Collects the instances of a node and stages their strip at the end.
#[derive(Debug)]
pub struct StripRenderer<I> {
    instances: Vec<I>,
}

impl<I> Default for StripRenderer<I> {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
        }
    }
}

impl<I> StripRenderer<I> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: StripInstance> PrimitiveRenderer for StripRenderer<I> {
    type Params = NodeParameter;
    type Instance = I;

    fn begin_rendering(
        &mut self,
        _renderer: &mut Renderer,
        _params: &NodeParameter,
        count: usize,
    ) -> RendererResult<()> {
        self.instances.clear();
        self.instances.reserve(count);
        Ok(())
    }

    fn rendering(
        &mut self,
        _renderer: &mut Renderer,
        _params: &NodeParameter,
        instance: &I,
    ) -> RendererResult<()> {
        self.instances.push(*instance);
        Ok(())
    }

    fn end_rendering(&mut self, renderer: &mut Renderer, params: &NodeParameter) -> RendererResult<()> {
        let instances = std::mem::take(&mut self.instances);
        if instances.len() < 2 {
            return Ok(());
        }
        let vertices = build_strip(&instances, renderer.camera_front_direction());
        renderer.stage_vertices(&params.standard_state(), &vertices)
    }
}

/// Convert a linear 0..1 color to 8-bit channels.
pub fn color_to_bytes(color: Vec4) -> [u8; 4] {
    let c = color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0 + 0.5;
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}
