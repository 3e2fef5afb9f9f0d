//! Renderer configuration and initialization arguments.

use std::sync::Arc;

use crate::backend::{HostCallbacks, NativeGraphics, ViewId};
use crate::render_state::RenderMode;
use crate::shader::ShaderType;

/// Configuration for initializing the effect renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSettings {
    /// View all draws are submitted to
    pub view_id: ViewId,
    /// Maximum number of vertices staged per frame
    pub square_max_count: u32,
    /// Sprite shader variants to load
    pub sprite_shaders: Vec<ShaderType>,
    /// Global render mode
    pub render_mode: RenderMode,
    /// Whether the host expects native state to be restored after rendering.
    /// Stored for the host's benefit; the renderer always sets full state.
    pub restore_states: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            view_id: ViewId(0),
            square_max_count: 8000,
            sprite_shaders: vec![ShaderType::Unlit],
            render_mode: RenderMode::Normal,
            restore_states: true,
        }
    }
}

impl RendererSettings {
    pub fn with_view_id(mut self, view_id: ViewId) -> Self {
        self.view_id = view_id;
        self
    }

    pub fn with_square_max_count(mut self, count: u32) -> Self {
        self.square_max_count = count;
        self
    }

    pub fn with_sprite_shaders(mut self, shaders: &[ShaderType]) -> Self {
        self.sprite_shaders = shaders.to_vec();
        self
    }

    /// Load all six sprite shader variants
    pub fn with_all_sprite_shaders(self) -> Self {
        self.with_sprite_shaders(&ShaderType::ALL)
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }
}

/// Everything the renderer needs from its host at startup
#[derive(Clone)]
pub struct InitArgs {
    pub native: Arc<dyn NativeGraphics>,
    pub host: Arc<dyn HostCallbacks>,
    pub settings: RendererSettings,
}

impl InitArgs {
    pub fn new(native: Arc<dyn NativeGraphics>, host: Arc<dyn HostCallbacks>) -> Self {
        Self {
            native,
            host,
            settings: RendererSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RendererSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl std::fmt::Debug for InitArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitArgs")
            .field("native", &self.native.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RendererSettings::default();
        assert_eq!(settings.view_id, ViewId(0));
        assert_eq!(settings.square_max_count, 8000);
        assert_eq!(settings.sprite_shaders, vec![ShaderType::Unlit]);
        assert_eq!(settings.render_mode, RenderMode::Normal);
    }

    #[test]
    fn test_builder() {
        let settings = RendererSettings::default()
            .with_view_id(ViewId(3))
            .with_square_max_count(100)
            .with_all_sprite_shaders()
            .with_render_mode(RenderMode::Wireframe);
        assert_eq!(settings.view_id, ViewId(3));
        assert_eq!(settings.square_max_count, 100);
        assert_eq!(settings.sprite_shaders.len(), 6);
        assert_eq!(settings.render_mode, RenderMode::Wireframe);
    }
}
