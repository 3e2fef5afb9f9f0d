//! Common utilities for renderer integration tests.
//!
//! Every test runs against the in-memory recording backend, so the full
//! native call stream can be inspected.

use std::sync::Arc;

use effect_renderer::backend::recording::{CatalogHost, NativeCall, RecordingGraphics};
use effect_renderer::backend::UniformKind;
use effect_renderer::{InitArgs, PrimitiveVertex, Renderer, RendererSettings};
use glam::{Vec2, Vec3};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shared setup: recording backend, catalog host and an initialized renderer.
pub struct TestContext {
    pub native: Arc<RecordingGraphics>,
    pub host: Arc<CatalogHost>,
    pub renderer: Renderer,
}

impl TestContext {
    pub fn new(settings: RendererSettings) -> Self {
        init_logging();
        let native = Arc::new(RecordingGraphics::new());
        let host = Arc::new(CatalogHost::with_standard_shaders(native.clone()));
        Self::with_host(native, host, settings)
    }

    pub fn with_host(
        native: Arc<RecordingGraphics>,
        host: Arc<CatalogHost>,
        settings: RendererSettings,
    ) -> Self {
        let renderer = Renderer::new(InitArgs::new(native.clone(), host.clone()).with_settings(settings))
            .expect("renderer initialization failed");
        Self {
            native,
            host,
            renderer,
        }
    }

    /// Recorded submits, in order.
    pub fn submits(&self) -> Vec<NativeCall> {
        self.native
            .calls()
            .into_iter()
            .filter(|c| matches!(c, NativeCall::Submit { .. }))
            .collect()
    }
}

/// Uniforms of the standard sprite vertex stage.
#[allow(dead_code)]
pub const SPRITE_VS_UNIFORMS: [(&str, UniformKind, u16); 4] = [
    ("u_Camera", UniformKind::Mat4, 1),
    ("u_CameraProj", UniformKind::Mat4, 1),
    ("u_UVInversed", UniformKind::Vec4, 1),
    ("u_vsFlipbookParameter", UniformKind::Vec4, 1),
];

/// An axis-aligned unit quad at depth `z`, in staging order.
#[allow(dead_code)]
pub fn quad(z: f32) -> [PrimitiveVertex; 4] {
    [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)].map(|(x, y)| PrimitiveVertex {
        pos: Vec3::new(x, y, z),
        uv: Vec2::new(x + 0.5, 0.5 - y),
        ..Default::default()
    })
}
