//! Sprites: one quad per instance.

use glam::{Mat4, Vec2, Vec3};

use super::{NodeParameter, PrimitiveRenderer};
use crate::error::RendererResult;
use crate::renderer::Renderer;
use crate::standard::StandardState;
use crate::vertex::PrimitiveVertex;

/// Corner positions of the unit quad, in staging order.
const CORNERS: [Vec2; 4] = [
    Vec2::new(-0.5, -0.5),
    Vec2::new(0.5, -0.5),
    Vec2::new(-0.5, 0.5),
    Vec2::new(0.5, 0.5),
];

/// How a sprite is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Billboard {
    /// Faces the camera; the transform supplies position and scale.
    #[default]
    Camera,
    /// Uses the full transform.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteInstance {
    pub transform: Mat4,
    /// Per-corner colors, in the order of the quad corners.
    pub colors: [[u8; 4]; 4],
    /// Texture rectangle: x, y, width, height.
    pub uv: [f32; 4],
    pub billboard: Billboard,
}

impl Default for SpriteInstance {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            colors: [[255; 4]; 4],
            uv: [0.0, 0.0, 1.0, 1.0],
            billboard: Billboard::Camera,
        }
    }
}

impl SpriteInstance {
    /// The quad's four vertices for a camera with view matrix `camera`.
    pub fn vertices(&self, camera: &Mat4) -> [PrimitiveVertex; 4] {
        let [x, y, w, h] = self.uv;
        let uvs = [
            Vec2::new(x, y + h),
            Vec2::new(x + w, y + h),
            Vec2::new(x, y),
            Vec2::new(x + w, y),
        ];

        let (origin, right, up, normal) = match self.billboard {
            Billboard::Camera => {
                let scale = Vec2::new(
                    self.transform.x_axis.truncate().length(),
                    self.transform.y_axis.truncate().length(),
                );
                let right = camera.row(0).truncate().normalize_or_zero();
                let up = camera.row(1).truncate().normalize_or_zero();
                let normal = camera.row(2).truncate().normalize_or_zero();
                (
                    self.transform.w_axis.truncate(),
                    right * scale.x,
                    up * scale.y,
                    normal,
                )
            }
            Billboard::Fixed => (
                self.transform.w_axis.truncate(),
                self.transform.x_axis.truncate(),
                self.transform.y_axis.truncate(),
                self.transform.transform_vector3(Vec3::Z).normalize_or_zero(),
            ),
        };
        let tangent = right.normalize_or_zero();

        std::array::from_fn(|i| PrimitiveVertex {
            pos: origin + right * CORNERS[i].x + up * CORNERS[i].y,
            color: self.colors[i],
            uv: uvs[i],
            normal,
            tangent,
        })
    }
}

/// Stages one quad per instance.
#[derive(Debug, Default)]
pub struct SpriteRenderer {
    state: Option<StandardState>,
}

impl SpriteRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrimitiveRenderer for SpriteRenderer {
    type Params = NodeParameter;
    type Instance = SpriteInstance;

    fn begin_rendering(
        &mut self,
        _renderer: &mut Renderer,
        params: &NodeParameter,
        count: usize,
    ) -> RendererResult<()> {
        log::trace!("Sprites: {count} instances");
        self.state = Some(params.standard_state());
        Ok(())
    }

    fn rendering(
        &mut self,
        renderer: &mut Renderer,
        params: &NodeParameter,
        instance: &SpriteInstance,
    ) -> RendererResult<()> {
        let state = self.state.get_or_insert_with(|| params.standard_state());
        let vertices = instance.vertices(&renderer.camera_matrix());
        renderer.stage_vertices(state, &vertices)
    }

    fn end_rendering(&mut self, _renderer: &mut Renderer, _params: &NodeParameter) -> RendererResult<()> {
        self.state = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sprite_uses_transform() {
        let instance = SpriteInstance {
            transform: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
                * Mat4::from_scale(Vec3::splat(2.0)),
            billboard: Billboard::Fixed,
            ..Default::default()
        };
        let v = instance.vertices(&Mat4::IDENTITY);
        assert_eq!(v[0].pos, Vec3::new(0.0, 1.0, 3.0));
        assert_eq!(v[3].pos, Vec3::new(2.0, 3.0, 3.0));
        assert_eq!(v[0].uv, Vec2::new(0.0, 1.0));
        assert_eq!(v[3].uv, Vec2::new(1.0, 0.0));
        assert_eq!(v[0].normal, Vec3::Z);
    }

    #[test]
    fn test_camera_billboard_faces_camera() {
        // Camera rotated 90 degrees around Y.
        let camera = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let instance = SpriteInstance::default();
        let v = instance.vertices(&camera);

        let right = v[1].pos - v[0].pos;
        assert!((right - camera.row(0).truncate()).length() < 1e-5);
        let up = v[2].pos - v[0].pos;
        assert!((up - Vec3::Y).length() < 1e-5);
    }
}
