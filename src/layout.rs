//! Vertex layout descriptions and their translation to native attributes.
//!
//! Effect shaders describe their vertex input as a list of semantic elements
//! (`POSITION`, `NORMAL<n>`, `TEXCOORD<n>`). The native API only knows a fixed
//! set of attribute slots, so `NORMAL` indices are spread over the normal,
//! tangent, bitangent and spare color slots:
//!
//! | `NORMAL` index | slot      |
//! |----------------|-----------|
//! | 0              | color 0   |
//! | 1              | normal    |
//! | 2              | tangent   |
//! | 3              | bitangent |
//! | 4              | color 1   |
//! | 5              | color 2   |
//! | 6+             | color 3   |
//!
//! Compiled shaders read their inputs from those slots, so the table is fixed.

use crate::backend::{Attrib, AttribType, NativeVertexLayout};
use crate::error::{RendererError, RendererResult};
use crate::shader::ShaderType;

/// Format of one vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayoutFormat {
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    /// Four 8-bit unsigned values normalized to 0.0-1.0.
    R8G8B8A8Unorm,
    /// Four 8-bit unsigned integers.
    R8G8B8A8Uint,
}

impl VertexLayoutFormat {
    /// Native `(components, type, normalized)` triple for this format.
    pub fn native(&self) -> (u8, AttribType, bool) {
        match self {
            Self::R32Float => (1, AttribType::Float, false),
            Self::R32G32Float => (2, AttribType::Float, false),
            Self::R32G32B32Float => (3, AttribType::Float, false),
            Self::R32G32B32A32Float => (4, AttribType::Float, false),
            Self::R8G8B8A8Unorm => (4, AttribType::Uint8, true),
            Self::R8G8B8A8Uint => (4, AttribType::Uint8, false),
        }
    }

    /// Size in bytes of one element of this format.
    pub fn size(&self) -> u32 {
        let (components, ty, _) = self.native();
        u32::from(components) * ty.size()
    }
}

/// One semantic vertex element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayoutElement {
    pub format: VertexLayoutFormat,
    pub semantic_name: String,
    pub semantic_index: u32,
}

impl VertexLayoutElement {
    pub fn new(format: VertexLayoutFormat, semantic_name: &str, semantic_index: u32) -> Self {
        Self {
            format,
            semantic_name: semantic_name.to_string(),
            semantic_index,
        }
    }

    /// Native attribute slot this element binds to.
    pub fn attrib(&self) -> RendererResult<Attrib> {
        match self.semantic_name.as_str() {
            "POSITION" => Ok(Attrib::Position),
            "NORMAL" => Ok(match self.semantic_index {
                0 => Attrib::Color0,
                1 => Attrib::Normal,
                2 => Attrib::Tangent,
                3 => Attrib::Bitangent,
                4 => Attrib::Color1,
                5 => Attrib::Color2,
                _ => Attrib::Color3,
            }),
            "TEXCOORD" => u8::try_from(self.semantic_index)
                .map(Attrib::TexCoord)
                .map_err(|_| self.unknown()),
            _ => Err(self.unknown()),
        }
    }

    fn unknown(&self) -> RendererError {
        RendererError::UnknownSemantic {
            name: self.semantic_name.clone(),
            index: self.semantic_index,
        }
    }
}

/// Ordered list of vertex elements describing one interleaved vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    elements: Vec<VertexLayoutElement>,
}

impl VertexLayout {
    pub fn new(elements: Vec<VertexLayoutElement>) -> Self {
        Self { elements }
    }

    /// Add an element (builder pattern).
    pub fn with(mut self, format: VertexLayoutFormat, semantic: &str, index: u32) -> Self {
        self.elements
            .push(VertexLayoutElement::new(format, semantic, index));
        self
    }

    pub fn elements(&self) -> &[VertexLayoutElement] {
        &self.elements
    }

    /// Sum of the element sizes.
    pub fn stride(&self) -> u32 {
        self.elements.iter().map(|e| e.format.size()).sum()
    }

    /// Translate to native attribute bindings.
    ///
    /// Fails on the first element with an unknown semantic; nothing is
    /// created in that case.
    pub fn translate(&self) -> RendererResult<NativeVertexLayout> {
        let mut native = NativeVertexLayout::new();
        for element in &self.elements {
            let attrib = element.attrib()?;
            let (components, ty, normalized) = element.format.native();
            native.add(attrib, components, ty, normalized, false);
        }
        Ok(native)
    }

    /// Element list for a sprite shader variant.
    pub fn standard(ty: ShaderType) -> Self {
        use VertexLayoutFormat::*;

        let base = if ty.is_lit() || ty.is_distortion() {
            Self::default()
                .with(R32G32B32Float, "POSITION", 0)
                .with(R8G8B8A8Unorm, "NORMAL", 0)
                .with(R8G8B8A8Unorm, "NORMAL", 1)
                .with(R8G8B8A8Unorm, "NORMAL", 2)
                .with(R32G32Float, "TEXCOORD", 0)
                .with(R32G32Float, "TEXCOORD", 1)
        } else {
            Self::default()
                .with(R32G32B32Float, "POSITION", 0)
                .with(R8G8B8A8Unorm, "NORMAL", 0)
                .with(R32G32Float, "TEXCOORD", 0)
        };

        if !ty.is_advanced() {
            return base;
        }

        // Advanced data continues after the last standard texcoord:
        // alpha/distortion UV, blend UV, blend alpha/distortion UV,
        // flipbook index and alpha threshold.
        let first = if ty.is_lit() || ty.is_distortion() { 2 } else { 1 };
        base.with(R32G32B32A32Float, "TEXCOORD", first)
            .with(R32G32Float, "TEXCOORD", first + 1)
            .with(R32G32B32A32Float, "TEXCOORD", first + 2)
            .with(R32Float, "TEXCOORD", first + 3)
            .with(R32Float, "TEXCOORD", first + 4)
    }

    /// Element list for static model geometry.
    pub fn model() -> Self {
        use VertexLayoutFormat::*;

        Self::default()
            .with(R32G32B32Float, "POSITION", 0)
            .with(R32G32B32Float, "NORMAL", 1)
            .with(R32G32B32Float, "NORMAL", 3)
            .with(R32G32B32Float, "NORMAL", 2)
            .with(R32G32Float, "TEXCOORD", 0)
            .with(R8G8B8A8Unorm, "NORMAL", 0)
    }
}

/// Widest sprite vertex stride over all shader variants.
pub fn max_sprite_stride() -> u32 {
    ShaderType::ALL
        .iter()
        .map(|ty| VertexLayout::standard(*ty).stride())
        .max()
        .unwrap_or(0)
}

/// Narrowest sprite vertex stride over the standard (non-advanced) variants.
pub fn min_sprite_stride() -> u32 {
    ShaderType::ALL
        .iter()
        .filter(|ty| !ty.is_advanced())
        .map(|ty| VertexLayout::standard(*ty).stride())
        .min()
        .unwrap_or(1)
}
