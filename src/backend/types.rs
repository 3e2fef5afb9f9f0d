//! Native types shared between the renderer core and backend implementations

use bitflags::bitflags;

/// Handle to a compiled shader stage returned by the host loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Handle to a linked vertex/fragment program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Handle to a named uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub u32);

/// Handle to a registered vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayoutHandle(pub u32);

/// Handle to a static vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferHandle(pub u32);

/// Handle to a static index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferHandle(pub u32);

/// Handle to per-frame transient vertex storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransientVertexBufferHandle(pub u32);

/// Handle to a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Identifier of the view (pass) draws are submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewId(pub u16);

/// Shader stage a compiled shader belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Stage suffix used by the host shader loader
    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Fragment => "fs",
        }
    }
}

/// Native vertex attribute slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attrib {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color0,
    Color1,
    Color2,
    Color3,
    TexCoord(u8),
}

/// Component type of a native vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribType {
    Uint8,
    Float,
}

impl AttribType {
    pub fn size(&self) -> u32 {
        match self {
            AttribType::Uint8 => 1,
            AttribType::Float => 4,
        }
    }
}

/// One attribute of a native vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAttribute {
    pub attrib: Attrib,
    pub components: u8,
    pub ty: AttribType,
    pub normalized: bool,
    pub as_int: bool,
    pub offset: u32,
}

/// Native vertex layout: attributes in declaration order plus the total stride
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NativeVertexLayout {
    pub attributes: Vec<NativeAttribute>,
    pub stride: u32,
}

impl NativeVertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute, placing it at the current end of the vertex
    pub fn add(
        &mut self,
        attrib: Attrib,
        components: u8,
        ty: AttribType,
        normalized: bool,
        as_int: bool,
    ) -> &mut Self {
        self.attributes.push(NativeAttribute {
            attrib,
            components,
            ty,
            normalized,
            as_int,
            offset: self.stride,
        });
        self.stride += u32::from(components) * ty.size();
        self
    }

    pub fn find(&self, attrib: Attrib) -> Option<&NativeAttribute> {
        self.attributes.iter().find(|a| a.attrib == attrib)
    }
}

/// Kind of a shader uniform as reported by the native API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Sampler,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    /// Bytes occupied by one element of this kind in a constant buffer
    pub fn element_size(&self) -> usize {
        match self {
            UniformKind::Sampler => 4,
            UniformKind::Vec4 => 16,
            UniformKind::Mat3 => 36,
            UniformKind::Mat4 => 64,
        }
    }
}

/// Uniform metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub kind: UniformKind,
    /// Element count
    pub num: u16,
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexStride {
    U16,
    U32,
}

impl IndexStride {
    pub fn bytes(&self) -> usize {
        match self {
            IndexStride::U16 => 2,
            IndexStride::U32 => 4,
        }
    }
}

/// Texture formats the core creates itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8 => 4,
        }
    }
}

bitflags! {
    /// Sampler overrides passed with a texture binding.
    ///
    /// The empty set means linear min/mag/mip filtering with repeat addressing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SamplerFlags: u32 {
        const U_CLAMP = 0x0000_0002;
        const V_CLAMP = 0x0000_0008;
        const MIN_POINT = 0x0000_0040;
        const MAG_POINT = 0x0000_0100;
        const MIP_POINT = 0x0000_0400;
    }
}

bitflags! {
    /// Pipeline state bits.
    ///
    /// Depth test, blend function and blend equation are packed multi-bit
    /// fields; build them with the associated constants and the
    /// `blend_*_separate` constructors rather than or-ing raw values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u64 {
        const WRITE_R = 0x0000_0000_0000_0001;
        const WRITE_G = 0x0000_0000_0000_0002;
        const WRITE_B = 0x0000_0000_0000_0004;
        const WRITE_A = 0x0000_0000_0000_0008;
        const WRITE_RGB = Self::WRITE_R.bits() | Self::WRITE_G.bits() | Self::WRITE_B.bits();
        const WRITE_Z = 0x0000_0040_0000_0000;

        const DEPTH_TEST_LESS = 0x0000_0000_0000_0010;
        const DEPTH_TEST_LEQUAL = 0x0000_0000_0000_0020;
        const DEPTH_TEST_EQUAL = 0x0000_0000_0000_0030;
        const DEPTH_TEST_GEQUAL = 0x0000_0000_0000_0040;
        const DEPTH_TEST_GREATER = 0x0000_0000_0000_0050;
        const DEPTH_TEST_NOTEQUAL = 0x0000_0000_0000_0060;
        const DEPTH_TEST_NEVER = 0x0000_0000_0000_0070;
        const DEPTH_TEST_ALWAYS = 0x0000_0000_0000_0080;
        const DEPTH_TEST_MASK = 0x0000_0000_0000_00f0;

        const BLEND_MASK = 0x0000_0000_0fff_f000;
        const BLEND_EQUATION_MASK = 0x0000_0003_f000_0000;

        const CULL_CW = 0x0000_0010_0000_0000;
        const CULL_CCW = 0x0000_0020_0000_0000;
        const CULL_MASK = 0x0000_0030_0000_0000;

        const FRONT_CCW = 0x0000_0080_0000_0000;
        const MSAA = 0x0100_0000_0000_0000;
    }
}

/// Blend factor codes for the packed blend-function field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
}

impl BlendFactor {
    const fn code(self) -> u64 {
        match self {
            BlendFactor::Zero => 0x1000,
            BlendFactor::One => 0x2000,
            BlendFactor::SrcColor => 0x3000,
            BlendFactor::InvSrcColor => 0x4000,
            BlendFactor::SrcAlpha => 0x5000,
            BlendFactor::InvSrcAlpha => 0x6000,
            BlendFactor::DstAlpha => 0x7000,
            BlendFactor::InvDstAlpha => 0x8000,
            BlendFactor::DstColor => 0x9000,
            BlendFactor::InvDstColor => 0xa000,
        }
    }
}

/// Blend equation codes for the packed blend-equation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Sub,
    RevSub,
    Min,
    Max,
}

impl BlendEquation {
    const fn code(self) -> u64 {
        match self {
            BlendEquation::Add => 0x0000_0000,
            BlendEquation::Sub => 0x1000_0000,
            BlendEquation::RevSub => 0x2000_0000,
            BlendEquation::Min => 0x3000_0000,
            BlendEquation::Max => 0x4000_0000,
        }
    }
}

impl StateFlags {
    /// Separate color/alpha blend functions
    pub const fn blend_func_separate(
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_a: BlendFactor,
        dst_a: BlendFactor,
    ) -> Self {
        let rgb = src_rgb.code() | (dst_rgb.code() << 4);
        let alpha = src_a.code() | (dst_a.code() << 4);
        Self::from_bits_retain(rgb | (alpha << 8))
    }

    /// Separate color/alpha blend equations
    pub const fn blend_equation_separate(rgb: BlendEquation, alpha: BlendEquation) -> Self {
        Self::from_bits_retain(rgb.code() | (alpha.code() << 3))
    }

    /// Depth-test field of these flags
    pub fn depth_test(&self) -> Self {
        *self & Self::DEPTH_TEST_MASK
    }

    /// Blend-function field of these flags
    pub fn blend_func(&self) -> Self {
        *self & Self::BLEND_MASK
    }

    /// Blend-equation field of these flags
    pub fn blend_equation(&self) -> Self {
        *self & Self::BLEND_EQUATION_MASK
    }
}
