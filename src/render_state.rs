//! Logical render state and its translation to native pipeline flags.

use crate::backend::{BlendEquation, BlendFactor, NativeGraphics, SamplerFlags, StateFlags};
use crate::shader::MAX_SAMPLERS;

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullingType {
    Front,
    #[default]
    Back,
    None,
}

/// Blend mode of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaBlendType {
    Opaque,
    #[default]
    Blend,
    Add,
    Sub,
    Mul,
}

/// Texture filtering of one sampler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// Texture addressing of one sampler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    Clamp,
}

/// Global rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    Normal,
    /// Forces opaque blending on every draw.
    Wireframe,
}

/// Logical pipeline state requested by a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub culling: CullingType,
    pub alpha_blend: AlphaBlendType,
    pub texture_filters: [TextureFilter; MAX_SAMPLERS],
    pub texture_wraps: [TextureWrap; MAX_SAMPLERS],
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            culling: CullingType::default(),
            alpha_blend: AlphaBlendType::default(),
            texture_filters: [TextureFilter::default(); MAX_SAMPLERS],
            texture_wraps: [TextureWrap::default(); MAX_SAMPLERS],
        }
    }
}

impl RenderState {
    /// Translate to native pipeline flags.
    ///
    /// Pure: the same state and mode always produce the same flags.
    pub fn translate(&self, mode: RenderMode) -> StateFlags {
        use BlendEquation as E;
        use BlendFactor as F;

        let mut flags =
            StateFlags::WRITE_RGB | StateFlags::WRITE_A | StateFlags::FRONT_CCW | StateFlags::MSAA;

        flags |= if self.depth_test {
            StateFlags::DEPTH_TEST_LEQUAL
        } else {
            StateFlags::DEPTH_TEST_ALWAYS
        };

        if self.depth_write {
            flags |= StateFlags::WRITE_Z;
        }

        match self.culling {
            CullingType::Front => flags |= StateFlags::CULL_CW,
            CullingType::Back => flags |= StateFlags::CULL_CCW,
            CullingType::None => {}
        }

        let blend = if mode == RenderMode::Wireframe {
            AlphaBlendType::Opaque
        } else {
            self.alpha_blend
        };

        flags |= match blend {
            AlphaBlendType::Opaque => {
                StateFlags::blend_equation_separate(E::Add, E::Max)
                    | StateFlags::blend_func_separate(F::One, F::Zero, F::One, F::One)
            }
            AlphaBlendType::Sub => {
                StateFlags::blend_equation_separate(E::RevSub, E::Add)
                    | StateFlags::blend_func_separate(F::SrcAlpha, F::One, F::Zero, F::One)
            }
            AlphaBlendType::Blend => {
                StateFlags::blend_equation_separate(E::Add, E::Max)
                    | StateFlags::blend_func_separate(F::SrcAlpha, F::InvSrcAlpha, F::One, F::One)
            }
            AlphaBlendType::Add => {
                StateFlags::blend_equation_separate(E::Add, E::Max)
                    | StateFlags::blend_func_separate(F::SrcAlpha, F::One, F::One, F::One)
            }
            AlphaBlendType::Mul => {
                StateFlags::blend_equation_separate(E::Add, E::Add)
                    | StateFlags::blend_func_separate(F::Zero, F::SrcColor, F::Zero, F::One)
            }
        };

        flags
    }

    /// Sampler flags for a texture slot.
    pub fn sampler_flags(&self, slot: usize) -> SamplerFlags {
        let mut flags = SamplerFlags::empty();
        if self.texture_filters.get(slot) == Some(&TextureFilter::Nearest) {
            flags |= SamplerFlags::MIN_POINT | SamplerFlags::MAG_POINT | SamplerFlags::MIP_POINT;
        }
        if self.texture_wraps.get(slot) == Some(&TextureWrap::Clamp) {
            flags |= SamplerFlags::U_CLAMP | SamplerFlags::V_CLAMP;
        }
        flags
    }
}

/// Pending and active render state of a renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderStateTracker {
    next: RenderState,
    active: RenderState,
}

impl RenderStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State the next `update` applies.
    pub fn next_mut(&mut self) -> &mut RenderState {
        &mut self.next
    }

    pub fn next(&self) -> &RenderState {
        &self.next
    }

    /// State last applied to the pipeline.
    pub fn active(&self) -> &RenderState {
        &self.active
    }

    /// Apply the pending state.
    ///
    /// The state is re-applied on every call; `forced` is kept for callers
    /// that distinguish the two cases.
    pub fn update(&mut self, _forced: bool, mode: RenderMode, native: &dyn NativeGraphics) {
        self.active = self.next;
        let flags = self.active.translate(mode);
        log::trace!("Render state {:#018x}", flags.bits());
        native.set_state(flags);
    }

    /// Reset the pending state to defaults.
    pub fn reset(&mut self) {
        self.next = RenderState::default();
    }
}
