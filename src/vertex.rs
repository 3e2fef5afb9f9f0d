//! Vertex formats written into the transient and model buffers.
//!
//! Every struct matches one element list in [`crate::layout::VertexLayout`]
//! byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::shader::ShaderType;

/// Unlit sprite vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SimpleVertex {
    pub pos: [f32; 3],
    pub col: [u8; 4],
    pub uv: [f32; 2],
}

/// Lit and distortion sprite vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct LightingVertex {
    pub pos: [f32; 3],
    pub col: [u8; 4],
    pub normal: [u8; 4],
    pub tangent: [u8; 4],
    pub uv1: [f32; 2],
    pub uv2: [f32; 2],
}

/// Per-vertex data of the advanced shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AdvancedParams {
    pub alpha_dist_uv: [f32; 4],
    pub blend_uv: [f32; 2],
    pub blend_alpha_dist_uv: [f32; 4],
    pub flipbook_index_and_next_rate: f32,
    pub alpha_threshold: f32,
}

/// Advanced unlit sprite vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AdvancedSimpleVertex {
    pub base: SimpleVertex,
    pub advanced: AdvancedParams,
}

/// Advanced lit and distortion sprite vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AdvancedLightingVertex {
    pub base: LightingVertex,
    pub advanced: AdvancedParams,
}

/// Static model vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub binormal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [f32; 2],
    pub color: [u8; 4],
}

const_assert_eq!(size_of::<SimpleVertex>(), 24);
const_assert_eq!(size_of::<LightingVertex>(), 40);
const_assert_eq!(size_of::<AdvancedSimpleVertex>(), 72);
const_assert_eq!(size_of::<AdvancedLightingVertex>(), 88);
const_assert_eq!(size_of::<ModelVertex>(), 60);

/// Layout-independent vertex produced by the primitive renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveVertex {
    pub pos: Vec3,
    pub color: [u8; 4],
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
}

impl Default for PrimitiveVertex {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            color: [255; 4],
            uv: Vec2::ZERO,
            normal: Vec3::Z,
            tangent: Vec3::X,
        }
    }
}

/// Pack a unit vector into unsigned normalized bytes.
pub fn pack_vector(v: Vec3) -> [u8; 4] {
    let n = (v.normalize_or_zero() * 0.5 + 0.5) * 255.0;
    [n.x as u8, n.y as u8, n.z as u8, 0]
}

impl PrimitiveVertex {
    /// Size of one vertex in the layout of `ty`.
    pub fn stride(ty: ShaderType) -> usize {
        match (ty.is_advanced(), ty.is_lit() || ty.is_distortion()) {
            (false, false) => size_of::<SimpleVertex>(),
            (false, true) => size_of::<LightingVertex>(),
            (true, false) => size_of::<AdvancedSimpleVertex>(),
            (true, true) => size_of::<AdvancedLightingVertex>(),
        }
    }

    /// Encode into `out`, which must be exactly [`Self::stride`] bytes long.
    pub fn write(&self, ty: ShaderType, out: &mut [u8]) {
        let simple = SimpleVertex {
            pos: self.pos.to_array(),
            col: self.color,
            uv: self.uv.to_array(),
        };
        let lighting = LightingVertex {
            pos: self.pos.to_array(),
            col: self.color,
            normal: pack_vector(self.normal),
            tangent: pack_vector(self.tangent),
            uv1: self.uv.to_array(),
            uv2: self.uv.to_array(),
        };
        match (ty.is_advanced(), ty.is_lit() || ty.is_distortion()) {
            (false, false) => out.copy_from_slice(bytemuck::bytes_of(&simple)),
            (false, true) => out.copy_from_slice(bytemuck::bytes_of(&lighting)),
            (true, false) => out.copy_from_slice(bytemuck::bytes_of(&AdvancedSimpleVertex {
                base: simple,
                advanced: AdvancedParams::default(),
            })),
            (true, true) => out.copy_from_slice(bytemuck::bytes_of(&AdvancedLightingVertex {
                base: lighting,
                advanced: AdvancedParams::default(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::VertexLayout;

    #[test]
    fn test_strides_match_layouts() {
        for ty in ShaderType::ALL {
            assert_eq!(
                PrimitiveVertex::stride(ty),
                VertexLayout::standard(ty).stride() as usize
            );
        }
        assert_eq!(
            size_of::<ModelVertex>(),
            VertexLayout::model().stride() as usize
        );
    }

    #[test]
    fn test_write_simple() {
        let vertex = PrimitiveVertex {
            pos: Vec3::new(1.0, 2.0, 3.0),
            color: [10, 20, 30, 40],
            uv: Vec2::new(0.5, 1.0),
            ..Default::default()
        };
        let mut out = [0u8; 24];
        vertex.write(ShaderType::Unlit, &mut out);

        let decoded: SimpleVertex = bytemuck::pod_read_unaligned(&out);
        assert_eq!(decoded.pos, [1.0, 2.0, 3.0]);
        assert_eq!(decoded.col, [10, 20, 30, 40]);
        assert_eq!(decoded.uv, [0.5, 1.0]);
    }

    #[test]
    fn test_pack_vector() {
        assert_eq!(pack_vector(Vec3::Z), [127, 127, 255, 0]);
        assert_eq!(pack_vector(Vec3::ZERO), [127, 127, 127, 0]);
    }
}
