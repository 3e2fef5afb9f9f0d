//! Ribbons: a camera-facing strip through the instance positions.

use glam::Vec3;

use super::{StripInstance, StripPoint, StripRenderer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RibbonInstance {
    pub position: Vec3,
    pub width: f32,
    pub color: [u8; 4],
}

impl Default for RibbonInstance {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            width: 1.0,
            color: [255; 4],
        }
    }
}

impl StripInstance for RibbonInstance {
    const LANES: usize = 1;

    fn position(&self) -> Vec3 {
        self.position
    }

    fn width(&self) -> f32 {
        self.width
    }

    fn cross_section(&self, _lane: usize, half: Vec3, v: f32) -> StripPoint {
        StripPoint {
            left: self.position - half,
            right: self.position + half,
            left_color: self.color,
            right_color: self.color,
            u: (0.0, 1.0),
            v,
        }
    }
}

pub type RibbonRenderer = StripRenderer<RibbonInstance>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::build_strip;

    #[test]
    fn test_ribbon_faces_view() {
        let instances: Vec<RibbonInstance> = (0..3)
            .map(|i| RibbonInstance {
                position: Vec3::new(0.0, i as f32, 0.0),
                width: 2.0,
                ..Default::default()
            })
            .collect();

        let vertices = build_strip(&instances, Vec3::Z);
        assert_eq!(vertices.len(), 8);
        // Path along +Y seen along +Z spreads along X.
        assert_eq!(vertices[0].pos, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(vertices[1].pos, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(vertices[6].uv.y, 1.0);
    }
}
