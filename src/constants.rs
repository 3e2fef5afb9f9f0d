//! Constant-buffer layouts shared with the compiled effect shaders.
//!
//! Each struct mirrors a shader-side constant block field for field. The
//! byte offsets fed to [`Shader::add_uniform`] come from `offset_of!` on
//! these structs, so a field reorder can't silently desynchronize the
//! bindings from the data written each draw.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use static_assertions::const_assert_eq;

use crate::error::RendererResult;
use crate::shader::{Shader, ShaderType, UniformBind, UniformStage};

/// Instances drawn per model submission.
pub const MAX_INSTANCED: usize = 20;

/// Sampler slot of the color texture.
pub const COLOR_TEXTURE_SLOT: usize = 0;
/// Sampler slot of the normal texture used by lit variants.
pub const NORMAL_TEXTURE_SLOT: usize = 1;

/// Vertex constants of the sprite-like shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StandardVertexConstants {
    pub camera: Mat4,
    pub camera_proj: Mat4,
    pub uv_inversed: [f32; 4],
    pub flipbook_parameter: [f32; 4],
}

/// Pixel constants of the non-distortion shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PixelConstants {
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub light_ambient_color: [f32; 4],
    pub flipbook_param: [f32; 4],
    pub uv_distortion_param: [f32; 4],
    pub blend_texture_param: [f32; 4],
    pub camera_front_direction: [f32; 4],
    /// Falloff parameter, begin color, end color.
    pub falloff_param: [[f32; 4]; 3],
    pub emissive_param: [f32; 4],
    /// Edge color, edge parameter.
    pub edge_param: [[f32; 4]; 2],
    /// Soft particle parameter and two depth reconstruction parameters.
    pub soft_particle_param: [[f32; 4]; 3],
    pub uv_inversed_back: [f32; 4],
    pub misc_flags: [f32; 4],
}

/// Pixel constants of the distortion shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PixelConstantsDistortion {
    pub distortion_intensity: [f32; 4],
    pub uv_inversed_back: [f32; 4],
    pub flipbook_param: [f32; 4],
    pub blend_texture_param: [f32; 4],
    pub soft_particle_param: [[f32; 4]; 3],
}

/// Vertex constants of the standard model shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ModelVertexConstants {
    pub camera: Mat4,
    pub model: [Mat4; MAX_INSTANCED],
    pub model_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_color: [[f32; 4]; MAX_INSTANCED],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub light_ambient_color: [f32; 4],
    pub uv_inversed: [f32; 4],
}

/// Vertex constants of the advanced model shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ModelAdvancedVertexConstants {
    pub camera: Mat4,
    pub model: [Mat4; MAX_INSTANCED],
    pub model_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_alpha_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_uv_distortion_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_blend_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_blend_alpha_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_blend_uv_distortion_uv: [[f32; 4]; MAX_INSTANCED],
    pub model_flipbook_parameter: [f32; 4],
    pub model_flipbook_index_and_next_rate: [[f32; 4]; MAX_INSTANCED],
    pub model_alpha_threshold: [[f32; 4]; MAX_INSTANCED],
    pub model_color: [[f32; 4]; MAX_INSTANCED],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub light_ambient_color: [f32; 4],
    pub uv_inversed: [f32; 4],
}

const_assert_eq!(size_of::<StandardVertexConstants>(), 160);
const_assert_eq!(size_of::<PixelConstants>(), 18 * 16);
const_assert_eq!(size_of::<PixelConstantsDistortion>(), 7 * 16);
const_assert_eq!(size_of::<ModelVertexConstants>(), 2048);
const_assert_eq!(size_of::<ModelAdvancedVertexConstants>(), 4304);

macro_rules! impl_default_zeroed {
    ($($ty:ty),*) => {
        $(impl Default for $ty {
            fn default() -> Self {
                Zeroable::zeroed()
            }
        })*
    };
}

impl_default_zeroed!(
    StandardVertexConstants,
    PixelConstants,
    PixelConstantsDistortion,
    ModelVertexConstants,
    ModelAdvancedVertexConstants
);

fn bind_all(
    shader: &mut Shader,
    stage: UniformStage,
    uniforms: &[(&str, usize)],
) -> RendererResult<()> {
    for (name, offset) in uniforms {
        if shader.add_uniform(name, stage, *offset)? == UniformBind::Missing {
            log::trace!("Shader {}: no uniform {name}", shader.name());
        }
    }
    Ok(())
}

fn bind_samplers(shader: &mut Shader, ty: ShaderType) -> RendererResult<()> {
    let mut samplers = vec![("s_sampler_colorTex", COLOR_TEXTURE_SLOT)];
    if ty.is_lit() {
        samplers.push(("s_sampler_normalTex", NORMAL_TEXTURE_SLOT));
    }
    bind_all(shader, UniformStage::Texture, &samplers)
}

fn bind_pixel_constants(shader: &mut Shader, ty: ShaderType) -> RendererResult<()> {
    if ty.is_distortion() {
        return bind_distortion_pixel_constants(shader);
    }

    shader.set_pixel_constant_buffer_size(size_of::<PixelConstants>())?;
    bind_all(
        shader,
        UniformStage::Pixel,
        &[
            ("u_LightDirection", offset_of!(PixelConstants, light_direction)),
            ("u_LightColor", offset_of!(PixelConstants, light_color)),
            ("u_LightAmbientColor", offset_of!(PixelConstants, light_ambient_color)),
            ("u_FlipbookParam", offset_of!(PixelConstants, flipbook_param)),
            ("u_UVDistortionParam", offset_of!(PixelConstants, uv_distortion_param)),
            ("u_BlendTextureParam", offset_of!(PixelConstants, blend_texture_param)),
            (
                "u_CameraFrontDirection",
                offset_of!(PixelConstants, camera_front_direction),
            ),
            ("u_FalloffParam", offset_of!(PixelConstants, falloff_param)),
            // Misspelled in the compiled shaders.
            ("u_EmmisiveParam", offset_of!(PixelConstants, emissive_param)),
            ("u_EdgeParam", offset_of!(PixelConstants, edge_param)),
            ("u_SoftParticleParam", offset_of!(PixelConstants, soft_particle_param)),
            ("u_UVInversedBack", offset_of!(PixelConstants, uv_inversed_back)),
            ("u_MiscFlags", offset_of!(PixelConstants, misc_flags)),
        ],
    )
}

#[cfg(feature = "distortion")]
fn bind_distortion_pixel_constants(shader: &mut Shader) -> RendererResult<()> {
    shader.set_pixel_constant_buffer_size(size_of::<PixelConstantsDistortion>())?;
    bind_all(
        shader,
        UniformStage::Pixel,
        &[
            (
                "u_DistortionIntencity",
                offset_of!(PixelConstantsDistortion, distortion_intensity),
            ),
            (
                "u_UVInversedBack",
                offset_of!(PixelConstantsDistortion, uv_inversed_back),
            ),
            ("u_FlipbookParam", offset_of!(PixelConstantsDistortion, flipbook_param)),
            (
                "u_BlendTextureParam",
                offset_of!(PixelConstantsDistortion, blend_texture_param),
            ),
            (
                "u_SoftParticleParam",
                offset_of!(PixelConstantsDistortion, soft_particle_param),
            ),
        ],
    )
}

#[cfg(not(feature = "distortion"))]
fn bind_distortion_pixel_constants(shader: &mut Shader) -> RendererResult<()> {
    log::debug!(
        "Shader {}: distortion pixel constants disabled",
        shader.name()
    );
    Ok(())
}

/// Size the constant buffers of a sprite shader and bind its uniforms.
pub fn bind_sprite_uniforms(shader: &mut Shader, ty: ShaderType) -> RendererResult<()> {
    shader.set_vertex_constant_buffer_size(size_of::<StandardVertexConstants>())?;
    bind_all(
        shader,
        UniformStage::Vertex,
        &[
            ("u_Camera", offset_of!(StandardVertexConstants, camera)),
            ("u_CameraProj", offset_of!(StandardVertexConstants, camera_proj)),
            ("u_UVInversed", offset_of!(StandardVertexConstants, uv_inversed)),
            (
                "u_vsFlipbookParameter",
                offset_of!(StandardVertexConstants, flipbook_parameter),
            ),
        ],
    )?;
    bind_samplers(shader, ty)?;
    bind_pixel_constants(shader, ty)
}

/// Size the constant buffers of a model shader and bind its uniforms.
pub fn bind_model_uniforms(shader: &mut Shader, ty: ShaderType) -> RendererResult<()> {
    if ty.is_advanced() {
        type C = ModelAdvancedVertexConstants;
        shader.set_vertex_constant_buffer_size(size_of::<C>())?;
        bind_all(
            shader,
            UniformStage::Vertex,
            &[
                ("u_Camera", offset_of!(C, camera)),
                ("u_Model", offset_of!(C, model)),
                ("u_ModelUV", offset_of!(C, model_uv)),
                ("u_ModelAlphaUV", offset_of!(C, model_alpha_uv)),
                ("u_ModelUVDistortionUV", offset_of!(C, model_uv_distortion_uv)),
                ("u_ModelBlendUV", offset_of!(C, model_blend_uv)),
                ("u_ModelBlendAlphaUV", offset_of!(C, model_blend_alpha_uv)),
                (
                    "u_ModelBlendUVDistortionUV",
                    offset_of!(C, model_blend_uv_distortion_uv),
                ),
                ("u_ModelFlipbookParameter", offset_of!(C, model_flipbook_parameter)),
                (
                    "u_ModelFlipbookIndexAndNextRate",
                    offset_of!(C, model_flipbook_index_and_next_rate),
                ),
                ("u_ModelAlphaThreshold", offset_of!(C, model_alpha_threshold)),
                ("u_ModelColor", offset_of!(C, model_color)),
                ("u_LightDirection", offset_of!(C, light_direction)),
                ("u_LightColor", offset_of!(C, light_color)),
                ("u_LightAmbientColor", offset_of!(C, light_ambient_color)),
                ("u_UVInversed", offset_of!(C, uv_inversed)),
            ],
        )?;
    } else {
        type C = ModelVertexConstants;
        shader.set_vertex_constant_buffer_size(size_of::<C>())?;
        bind_all(
            shader,
            UniformStage::Vertex,
            &[
                ("u_Camera", offset_of!(C, camera)),
                ("u_Model", offset_of!(C, model)),
                ("u_ModelUV", offset_of!(C, model_uv)),
                ("u_ModelColor", offset_of!(C, model_color)),
                ("u_LightDirection", offset_of!(C, light_direction)),
                ("u_LightColor", offset_of!(C, light_color)),
                ("u_LightAmbientColor", offset_of!(C, light_ambient_color)),
                ("u_UVInversed", offset_of!(C, uv_inversed)),
            ],
        )?;
    }
    bind_samplers(shader, ty)?;
    bind_pixel_constants(shader, ty)
}
