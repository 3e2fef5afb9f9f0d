//! Tracks: camera-facing trails with a separate color at each edge and
//! the center line.

use glam::Vec3;

use super::{StripInstance, StripPoint, StripRenderer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInstance {
    pub position: Vec3,
    pub width: f32,
    pub color_left: [u8; 4],
    pub color_center: [u8; 4],
    pub color_right: [u8; 4],
}

impl Default for TrackInstance {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            width: 1.0,
            color_left: [255; 4],
            color_center: [255; 4],
            color_right: [255; 4],
        }
    }
}

/// Left half, then right half.
impl StripInstance for TrackInstance {
    const LANES: usize = 2;

    fn position(&self) -> Vec3 {
        self.position
    }

    fn width(&self) -> f32 {
        self.width
    }

    fn cross_section(&self, lane: usize, half: Vec3, v: f32) -> StripPoint {
        if lane == 0 {
            StripPoint {
                left: self.position - half,
                right: self.position,
                left_color: self.color_left,
                right_color: self.color_center,
                u: (0.0, 0.5),
                v,
            }
        } else {
            StripPoint {
                left: self.position,
                right: self.position + half,
                left_color: self.color_center,
                right_color: self.color_right,
                u: (0.5, 1.0),
                v,
            }
        }
    }
}

/// Stages two quads per segment.
pub type TrackRenderer = StripRenderer<TrackInstance>;
