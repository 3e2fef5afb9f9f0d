//! End-to-end tests of the effect renderer against the recording backend.
//!
//! # Test Categories
//!
//! - **Initialization**: index buffer sizing, shader loading, inert shaders
//! - **Constant binding**: staging constants and submitting uniforms
//! - **Buffers**: transient lock discipline and per-frame lifetime
//! - **Render state**: determinism and the wireframe override
//! - **Draw protocol**: primitives, batching and the model pipeline

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{quad, TestContext, SPRITE_VS_UNIFORMS};
use effect_renderer::backend::recording::{CatalogHost, NativeCall, RecordingGraphics};
use effect_renderer::backend::{IndexStride, ShaderStage, UniformKind};
use effect_renderer::constants::PixelConstants;
use effect_renderer::{
    AlphaBlendType, Model, ModelInstance, ModelParameter, ModelRenderer, ModelVertex,
    NodeParameter, PrimitiveRenderer, RenderMode, RenderState, RendererError, RendererSettings,
    RibbonInstance, RibbonRenderer, ShaderKey, ShaderType, SpriteInstance, SpriteRenderer,
    StandardState, TextureType,
};

// ============================================================================
// Initialization
// ============================================================================

#[rstest]
#[case::hundred(100, IndexStride::U16, 367)]
#[case::default_count(8000, IndexStride::U32, 29334)]
fn test_index_buffer_sizing(
    #[case] square_max_count: u32,
    #[case] stride: IndexStride,
    #[case] sprites: usize,
) {
    let ctx = TestContext::new(RendererSettings::default().with_square_max_count(square_max_count));
    let ib = ctx.renderer.index_buffer();
    let (native_stride, data) = ctx.native.index_buffer_data(ib.handle()).unwrap();

    assert_eq!(native_stride, stride);
    assert_eq!(data.len(), sprites * 6 * stride.bytes());
    if square_max_count == 100 {
        assert_eq!(data.len(), 4404);
    }

    // Every quad decodes to the fixed pattern offset by its first vertex.
    let decode = |i: usize| -> u32 {
        match stride {
            IndexStride::U16 => u16::from_le_bytes([data[2 * i], data[2 * i + 1]]) as u32,
            IndexStride::U32 => u32::from_le_bytes([
                data[4 * i],
                data[4 * i + 1],
                data[4 * i + 2],
                data[4 * i + 3],
            ]),
        }
    };
    for quad in [0, 1, sprites - 1] {
        let base = 4 * quad as u32;
        let indices: Vec<u32> = (0..6).map(|k| decode(quad * 6 + k)).collect();
        assert_eq!(
            indices,
            vec![base + 3, base + 1, base, base + 3, base, base + 2]
        );
    }
}

#[test]
fn test_all_sprite_variants_load_on_request() {
    let ctx = TestContext::new(RendererSettings::default().with_all_sprite_shaders());
    for ty in ShaderType::ALL {
        let shader = ctx.renderer.shader(ty).unwrap();
        assert!(shader.is_valid(), "{ty:?} should link");
    }
}

#[test]
fn test_link_failure_leaves_shader_inert() {
    let native = Arc::new(RecordingGraphics::new());
    let host = Arc::new(CatalogHost::with_standard_shaders(native.clone()));
    let broken = native.register_broken_shader(&SPRITE_VS_UNIFORMS);
    host.add_shader("sprite_unlit", ShaderStage::Vertex, broken);

    let mut ctx = TestContext::with_host(native, host, RendererSettings::default());
    assert!(!ctx.renderer.shader(ShaderType::Unlit).unwrap().is_valid());

    ctx.native.clear_calls();
    let key = ShaderKey::sprite(ShaderType::Unlit);
    ctx.renderer.begin_shader(key).unwrap();
    ctx.renderer
        .set_vertex_buffer_to_shader(&[1; 16], 128)
        .unwrap();
    ctx.renderer.submit_uniforms().unwrap();
    ctx.renderer.end_shader(key).unwrap();
    assert!(ctx.native.uniform_sets().is_empty());

    // Draws against the inert shader are skipped, not failed.
    ctx.renderer.begin_rendering().unwrap();
    ctx.renderer
        .stage_vertices(&StandardState::default(), &quad(0.0))
        .unwrap();
    ctx.renderer.end_rendering().unwrap();
    assert!(ctx.submits().is_empty());
    assert!(ctx.native.uniform_sets().is_empty());
}

#[test]
fn test_missing_shader_source_leaves_shader_inert() {
    let native = Arc::new(RecordingGraphics::new());
    let host = Arc::new(CatalogHost::new(native.clone()));
    let ctx = TestContext::with_host(native, host, RendererSettings::default());

    assert!(!ctx.renderer.shader(ShaderType::Unlit).unwrap().is_valid());
    assert!(!ctx
        .renderer
        .model_shader(ShaderType::Lit)
        .unwrap()
        .is_valid());
}

#[test]
fn test_allocation_failure_fails_initialization() {
    let native = Arc::new(RecordingGraphics::new());
    let host = Arc::new(CatalogHost::with_standard_shaders(native.clone()));
    native.set_fail_allocations(true);

    let result = effect_renderer::Renderer::new(effect_renderer::InitArgs::new(native, host));
    assert!(matches!(result, Err(RendererError::Backend(_))));
}

#[test]
fn test_teardown_releases_native_resources() {
    let ctx = TestContext::new(RendererSettings::default().with_all_sprite_shaders());
    let native = ctx.native.clone();
    assert!(native.live_programs() > 0);
    assert!(native.live_textures() > 0);

    drop(ctx);
    assert_eq!(native.live_programs(), 0);
    assert_eq!(native.live_layouts(), 0);
    assert_eq!(native.live_index_buffers(), 0);
    assert_eq!(native.live_textures(), 0);
}

// ============================================================================
// Constant binding
// ============================================================================

#[test]
fn test_staged_constants_reach_native_uniform() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let key = ShaderKey::sprite(ShaderType::Unlit);
    let data: Vec<u8> = (0..16).collect();

    ctx.renderer.begin_shader(key).unwrap();
    // u_UVInversed sits after the two matrices.
    ctx.renderer.set_vertex_buffer_to_shader(&data, 128).unwrap();
    ctx.native.clear_calls();
    ctx.renderer.submit_uniforms().unwrap();
    ctx.renderer.end_shader(key).unwrap();

    let handle = ctx.native.uniform_handle("u_UVInversed").unwrap();
    let sets = ctx.native.uniform_sets();
    let (_, bytes, num) = sets.iter().find(|(h, _, _)| *h == handle).unwrap();
    assert_eq!(bytes, &data);
    assert_eq!(*num, 1);
}

#[test]
fn test_constant_write_out_of_range_is_rejected() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let key = ShaderKey::sprite(ShaderType::Unlit);
    ctx.renderer.begin_shader(key).unwrap();
    assert!(matches!(
        ctx.renderer.set_vertex_buffer_to_shader(&[0; 16], 152),
        Err(RendererError::ConstantWriteOutOfRange { .. })
    ));
}

#[test]
fn test_staged_pixel_constants_reach_native_uniforms() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let key = ShaderKey::sprite(ShaderType::Unlit);
    let constants = PixelConstants {
        light_color: [0.1, 0.2, 0.3, 1.0],
        falloff_param: [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        ],
        edge_param: [[0.5; 4], [0.25; 4]],
        misc_flags: [1.0, 0.0, 0.0, 0.0],
        ..Default::default()
    };

    ctx.renderer.begin_shader(key).unwrap();
    ctx.renderer
        .set_pixel_buffer_to_shader(bytemuck::bytes_of(&constants), 0)
        .unwrap();
    ctx.native.clear_calls();
    ctx.renderer.submit_uniforms().unwrap();
    ctx.renderer.end_shader(key).unwrap();

    let sets = ctx.native.uniform_sets();
    let submitted = |name: &str| {
        let handle = ctx.native.uniform_handle(name).unwrap();
        sets.iter()
            .find(|(h, _, _)| *h == handle)
            .map(|(_, bytes, num)| (bytes.clone(), *num))
            .unwrap()
    };

    assert_eq!(
        submitted("u_LightColor"),
        (bytemuck::bytes_of(&constants.light_color).to_vec(), 1)
    );
    assert_eq!(
        submitted("u_FalloffParam"),
        (bytemuck::bytes_of(&constants.falloff_param).to_vec(), 3)
    );
    assert_eq!(
        submitted("u_EdgeParam"),
        (bytemuck::bytes_of(&constants.edge_param).to_vec(), 2)
    );
    assert_eq!(
        submitted("u_MiscFlags"),
        (bytemuck::bytes_of(&constants.misc_flags).to_vec(), 1)
    );
    for (_, bytes, num) in &sets {
        assert_eq!(bytes.len(), 16 * usize::from(*num));
    }
}

#[test]
fn test_uniform_larger_than_its_constant_slot_fails_initialization() {
    let native = Arc::new(RecordingGraphics::new());
    // u_UVInversed at 128 with four vectors runs past the 160-byte block.
    let vs = native.register_shader(&[
        ("u_Camera", UniformKind::Mat4, 1),
        ("u_CameraProj", UniformKind::Mat4, 1),
        ("u_UVInversed", UniformKind::Vec4, 4),
        ("u_vsFlipbookParameter", UniformKind::Vec4, 1),
    ]);
    let fs = native.register_shader(&[("s_sampler_colorTex", UniformKind::Sampler, 1)]);
    let host = Arc::new(CatalogHost::new(native.clone()));
    host.add_program("sprite_unlit", vs, fs);

    let result = effect_renderer::Renderer::new(effect_renderer::InitArgs::new(native, host));
    assert_eq!(
        result.err(),
        Some(RendererError::ConstantWriteOutOfRange {
            offset: 128,
            size: 64,
            capacity: 160,
        })
    );
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_transient_lock_discipline() {
    let mut ctx = TestContext::new(RendererSettings::default().with_square_max_count(100));
    ctx.renderer.begin_rendering().unwrap();
    let transient = ctx.renderer.transient_vertex_buffer_mut();

    let (offset, region) = transient.ring_buffer_lock(48, 24).unwrap();
    assert_eq!(offset, 0);
    region.fill(7);
    assert_eq!(
        transient.ring_buffer_lock(24, 24).err(),
        Some(RendererError::VertexBufferAlreadyLocked)
    );
    transient.unlock().unwrap();
    assert_eq!(transient.unlock(), Err(RendererError::VertexBufferNotLocked));

    let (offset, _) = transient.ring_buffer_lock(40, 40).unwrap();
    assert_eq!(offset, 80);
    transient.unlock().unwrap();

    let handle = transient.handle().unwrap();
    assert_eq!(&ctx.native.transient_data(handle).unwrap()[..48], &[7; 48]);
}

#[test]
fn test_transient_storage_is_per_frame() {
    let mut ctx = TestContext::new(RendererSettings::default());
    assert_eq!(
        ctx.renderer.transient_vertex_buffer_mut().lock().err(),
        Some(RendererError::FrameNotStarted)
    );

    ctx.renderer.begin_rendering().unwrap();
    let first = ctx.renderer.transient_vertex_buffer().handle().unwrap();
    ctx.renderer.end_rendering().unwrap();
    assert!(ctx.renderer.transient_vertex_buffer().handle().is_none());

    ctx.renderer.begin_rendering().unwrap();
    let second = ctx.renderer.transient_vertex_buffer().handle().unwrap();
    assert_ne!(first, second);
    assert_eq!(ctx.renderer.transient_vertex_buffer().write_offset(), 0);
}

#[test]
fn test_resizing_regenerates_buffers() {
    let mut ctx = TestContext::new(RendererSettings::default().with_square_max_count(100));
    ctx.renderer.set_square_max_count(200).unwrap();

    assert_eq!(ctx.renderer.transient_vertex_buffer().capacity(), 200 * 88);
    let (_, data) = ctx
        .native
        .index_buffer_data(ctx.renderer.index_buffer().handle())
        .unwrap();
    assert_eq!(data.len(), 734 * 6 * 2);
    assert_eq!(
        ctx.renderer.set_square_max_count(0),
        Err(RendererError::InvalidParameter(
            "square_max_count must be positive".to_string()
        ))
    );
}

// ============================================================================
// Render state
// ============================================================================

#[rstest]
#[case::opaque(AlphaBlendType::Opaque)]
#[case::blend(AlphaBlendType::Blend)]
#[case::add(AlphaBlendType::Add)]
#[case::sub(AlphaBlendType::Sub)]
#[case::mul(AlphaBlendType::Mul)]
fn test_wireframe_overrides_blend(#[case] blend: AlphaBlendType) {
    let mut ctx = TestContext::new(RendererSettings::default().with_render_mode(RenderMode::Wireframe));
    let opaque = RenderState {
        alpha_blend: AlphaBlendType::Opaque,
        ..Default::default()
    };

    ctx.renderer.render_state_mut().alpha_blend = blend;
    ctx.renderer.update_render_state(true);
    let first = ctx.native.last_state();
    ctx.renderer.update_render_state(false);

    assert_eq!(first, ctx.native.last_state());
    assert_eq!(first, Some(opaque.translate(RenderMode::Wireframe)));
}

#[test]
fn test_render_state_applied_per_batch() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let mut state = StandardState::default();
    state.render_state.depth_test = true;
    state.render_state.alpha_blend = AlphaBlendType::Add;

    ctx.renderer.begin_rendering().unwrap();
    ctx.renderer.stage_vertices(&state, &quad(0.0)).unwrap();
    ctx.renderer.end_rendering().unwrap();

    assert_eq!(
        ctx.native.last_state(),
        Some(state.render_state.translate(RenderMode::Normal))
    );
}

// ============================================================================
// Draw protocol
// ============================================================================

#[test]
fn test_sprite_protocol_draws_one_batch() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let params = NodeParameter::default();
    let mut sprites = SpriteRenderer::new();

    ctx.renderer.begin_rendering().unwrap();
    sprites.begin_rendering(&mut ctx.renderer, &params, 3).unwrap();
    for i in 0..3 {
        let instance = SpriteInstance {
            transform: glam::Mat4::from_translation(glam::Vec3::X * i as f32),
            ..Default::default()
        };
        sprites
            .rendering(&mut ctx.renderer, &params, &instance)
            .unwrap();
    }
    sprites.end_rendering(&mut ctx.renderer, &params).unwrap();
    assert!(ctx.submits().is_empty());
    ctx.renderer.end_rendering().unwrap();

    let calls = ctx.native.calls();
    assert_eq!(ctx.submits().len(), 1);
    assert!(calls.iter().any(|c| matches!(
        c,
        NativeCall::SetTransientVertexBuffer {
            start_vertex: 0,
            num_vertices: 12,
            ..
        }
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        NativeCall::SetIndexBuffer {
            num_indices: 18,
            ..
        }
    )));
}

#[rstest]
#[case::past_transient_storage(92, 0)]
#[case::offset_past_transient_storage(1, 363)]
#[case::past_index_buffer(368, 0)]
#[case::overflowing_count(u32::MAX / 4 + 1, 0)]
fn test_sprite_draw_past_buffers_is_rejected(#[case] sprites: u32, #[case] vertex_offset: u32) {
    // 100 squares: 8800 transient bytes (366 unlit vertices), 367 indexed quads.
    let mut ctx = TestContext::new(RendererSettings::default().with_square_max_count(100));
    let key = ShaderKey::sprite(ShaderType::Unlit);
    ctx.renderer.begin_rendering().unwrap();
    ctx.renderer.begin_shader(key).unwrap();
    ctx.renderer.set_layout(key).unwrap();
    ctx.native.clear_calls();

    assert!(matches!(
        ctx.renderer.draw_sprites(sprites, vertex_offset),
        Err(RendererError::InvalidParameter(_))
    ));
    assert!(ctx.native.calls().is_empty());

    // The largest draw that fits still goes through.
    ctx.renderer.draw_sprites(91, 0).unwrap();
    ctx.renderer.end_shader(key).unwrap();
    assert_eq!(ctx.submits().len(), 1);
}

#[test]
fn test_sprites_bind_loaded_textures() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let loader = ctx.renderer.create_texture_loader();
    let texture = loader.load("spark.png", TextureType::Color).unwrap();
    let params = NodeParameter {
        color_texture: Some(texture.clone()),
        ..Default::default()
    };
    let mut sprites = SpriteRenderer::new();

    ctx.renderer.begin_rendering().unwrap();
    sprites.begin_rendering(&mut ctx.renderer, &params, 1).unwrap();
    sprites
        .rendering(&mut ctx.renderer, &params, &SpriteInstance::default())
        .unwrap();
    sprites.end_rendering(&mut ctx.renderer, &params).unwrap();
    ctx.renderer.end_rendering().unwrap();

    assert!(ctx.native.calls().iter().any(|c| matches!(
        c,
        NativeCall::SetTexture { stage: 0, texture: t, .. } if *t == texture.handle()
    )));

    loader.unload(texture);
    drop(params);
    assert_eq!(ctx.host.unloaded().len(), 1);
}

#[test]
fn test_ribbons_and_sprites_with_same_state_share_a_draw() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let params = NodeParameter::default();
    let mut sprites = SpriteRenderer::new();
    let mut ribbons = RibbonRenderer::new();

    ctx.renderer.begin_rendering().unwrap();
    sprites.begin_rendering(&mut ctx.renderer, &params, 1).unwrap();
    sprites
        .rendering(&mut ctx.renderer, &params, &SpriteInstance::default())
        .unwrap();
    sprites.end_rendering(&mut ctx.renderer, &params).unwrap();

    ribbons.begin_rendering(&mut ctx.renderer, &params, 3).unwrap();
    for y in 0..3 {
        let instance = RibbonInstance {
            position: glam::Vec3::new(0.0, y as f32, 0.0),
            ..Default::default()
        };
        ribbons
            .rendering(&mut ctx.renderer, &params, &instance)
            .unwrap();
    }
    ribbons.end_rendering(&mut ctx.renderer, &params).unwrap();
    ctx.renderer.end_rendering().unwrap();

    assert_eq!(ctx.submits().len(), 1);
    assert!(ctx.native.calls().iter().any(|c| matches!(
        c,
        NativeCall::SetTransientVertexBuffer {
            num_vertices: 12,
            ..
        }
    )));
}

#[test]
fn test_unloaded_variant_is_reported() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let state = StandardState {
        shader: ShaderType::Lit,
        ..Default::default()
    };
    ctx.renderer.begin_rendering().unwrap();
    assert_eq!(
        ctx.renderer.stage_vertices(&state, &quad(0.0)),
        Err(RendererError::ShaderNotLoaded(ShaderType::Lit))
    );
}

#[test]
fn test_instanced_polygon_draw_fails_loudly() {
    let mut ctx = TestContext::new(RendererSettings::default());
    assert_eq!(
        ctx.renderer.draw_polygon_instanced(3, 3, 4),
        Err(RendererError::Unsupported("draw_polygon_instanced"))
    );
}

#[test]
fn test_model_flushes_pending_sprites_first() {
    let mut ctx = TestContext::new(RendererSettings::default());
    let model = Arc::new(Model::new(
        vec![
            ModelVertex::default(),
            ModelVertex {
                position: [1.0, 0.0, 0.0],
                ..Default::default()
            },
            ModelVertex {
                position: [0.0, 1.0, 0.0],
                ..Default::default()
            },
        ],
        vec![[0, 1, 2]],
    ));
    let params = ModelParameter {
        node: NodeParameter {
            lit: true,
            ..Default::default()
        },
        model: model.clone(),
    };
    let mut models = ModelRenderer::new();

    ctx.renderer.begin_rendering().unwrap();
    ctx.renderer
        .stage_vertices(&StandardState::default(), &quad(0.0))
        .unwrap();
    models.begin_rendering(&mut ctx.renderer, &params, 2).unwrap();
    assert_eq!(ctx.submits().len(), 1);

    for _ in 0..2 {
        models
            .rendering(&mut ctx.renderer, &params, &ModelInstance::default())
            .unwrap();
    }
    models.end_rendering(&mut ctx.renderer, &params).unwrap();
    ctx.renderer.end_rendering().unwrap();

    assert!(model.is_on_gpu());
    let calls = ctx.native.calls();
    assert_eq!(ctx.submits().len(), 2);
    assert!(calls.contains(&NativeCall::SetInstanceCount(2)));
    assert!(calls.iter().any(|c| matches!(
        c,
        NativeCall::SetVertexBuffer {
            num_vertices: 3,
            ..
        }
    )));

    // The lit model shader gets the flat-normal proxy in slot 1.
    assert!(calls
        .iter()
        .any(|c| matches!(c, NativeCall::SetTexture { stage: 1, .. })));
}
