//! Rings: an annulus sector in the instance's XY plane.

use glam::{Mat4, Vec2, Vec3};

use super::{NodeParameter, PrimitiveRenderer};
use crate::error::RendererResult;
use crate::renderer::Renderer;
use crate::standard::StandardState;
use crate::vertex::PrimitiveVertex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingInstance {
    pub transform: Mat4,
    pub outer_radius: f32,
    pub inner_radius: f32,
    pub outer_color: [u8; 4],
    pub inner_color: [u8; 4],
    /// Sector start and end, in radians.
    pub start_angle: f32,
    pub end_angle: f32,
    pub segments: u32,
}

impl Default for RingInstance {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            outer_radius: 1.0,
            inner_radius: 0.5,
            outer_color: [255; 4],
            inner_color: [255; 4],
            start_angle: 0.0,
            end_angle: std::f32::consts::TAU,
            segments: 16,
        }
    }
}

impl RingInstance {
    /// Four vertices per segment: outer edge first, then inner.
    pub fn vertices(&self) -> Vec<PrimitiveVertex> {
        let segments = self.segments.max(1);
        let normal = self.transform.transform_vector3(Vec3::Z).normalize_or_zero();
        let point = |angle: f32, radius: f32| {
            let local = Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0);
            self.transform.transform_point3(local)
        };

        let mut vertices = Vec::with_capacity(segments as usize * 4);
        for k in 0..segments {
            let t0 = k as f32 / segments as f32;
            let t1 = (k + 1) as f32 / segments as f32;
            let a0 = self.start_angle + (self.end_angle - self.start_angle) * t0;
            let a1 = self.start_angle + (self.end_angle - self.start_angle) * t1;
            let tangent = (point(a1, self.outer_radius) - point(a0, self.outer_radius))
                .normalize_or_zero();

            let corner = |pos: Vec3, color: [u8; 4], u: f32, v: f32| PrimitiveVertex {
                pos,
                color,
                uv: Vec2::new(u, v),
                normal,
                tangent,
            };
            vertices.extend([
                corner(point(a0, self.outer_radius), self.outer_color, t0, 1.0),
                corner(point(a1, self.outer_radius), self.outer_color, t1, 1.0),
                corner(point(a0, self.inner_radius), self.inner_color, t0, 0.0),
                corner(point(a1, self.inner_radius), self.inner_color, t1, 0.0),
            ]);
        }
        vertices
    }
}

/// Stages each ring as it arrives.
#[derive(Debug, Default)]
pub struct RingRenderer {
    state: Option<StandardState>,
}

impl RingRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrimitiveRenderer for RingRenderer {
    type Params = NodeParameter;
    type Instance = RingInstance;

    fn begin_rendering(
        &mut self,
        _renderer: &mut Renderer,
        params: &NodeParameter,
        count: usize,
    ) -> RendererResult<()> {
        log::trace!("Rings: {count} instances");
        self.state = Some(params.standard_state());
        Ok(())
    }

    fn rendering(
        &mut self,
        renderer: &mut Renderer,
        params: &NodeParameter,
        instance: &RingInstance,
    ) -> RendererResult<()> {
        let state = self.state.get_or_insert_with(|| params.standard_state());
        renderer.stage_vertices(state, &instance.vertices())
    }

    fn end_rendering(&mut self, _renderer: &mut Renderer, _params: &NodeParameter) -> RendererResult<()> {
        self.state = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_quarter_ring() {
        let ring = RingInstance {
            end_angle: FRAC_PI_2,
            segments: 2,
            inner_color: [0; 4],
            ..Default::default()
        };
        let vertices = ring.vertices();
        assert_eq!(vertices.len(), 8);

        assert!((vertices[0].pos - Vec3::X).length() < 1e-5);
        assert!((vertices[2].pos - Vec3::X * 0.5).length() < 1e-5);
        assert!((vertices[7].pos - Vec3::Y * 0.5).length() < 1e-5);
        assert_eq!(vertices[2].color, [0; 4]);
        assert_eq!(vertices[5].uv, Vec2::new(1.0, 1.0));
        assert_eq!(vertices[0].normal, Vec3::Z);
    }
}
