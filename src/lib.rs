//! Effect Renderer - a particle-effect rendering backend over an opaque
//! native graphics API
//!
//! The crate turns the draw requests of an effect runtime (sprites, ribbons,
//! rings, tracks and models) into native calls:
//! - Vertex layout translation from semantic element lists to native attributes
//! - Shader uniform tables with packed vertex/pixel constant buffers
//! - Render state translation to native pipeline state bits
//! - Ring-allocated transient vertex storage and static model buffers
//! - Sprite batching and an instanced model pipeline
//!
//! The native API is supplied by the host as an [`backend::NativeGraphics`]
//! implementation; [`backend::recording::RecordingGraphics`] is an in-memory
//! one for tests and tooling.

pub mod backend;
pub mod buffers;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod layout;
pub mod model;
pub mod primitives;
pub mod render_state;
pub mod renderer;
pub mod shader;
pub mod standard;
pub mod texture;
pub mod vertex;

pub use backend::{BackendError, HostCallbacks, NativeGraphics};
pub use buffers::{StaticIndexBuffer, StaticVertexBuffer, TransientVertexBuffer};
pub use config::{InitArgs, RendererSettings};
pub use device::{GraphicsDevice, TextureParameter};
pub use error::{RendererError, RendererResult};
pub use layout::{VertexLayout, VertexLayoutElement, VertexLayoutFormat};
pub use model::{Model, ModelInstance, ModelParameter, ModelRenderer};
pub use primitives::{
    NodeParameter, PrimitiveRenderer, RibbonInstance, RibbonRenderer, RingInstance, RingRenderer,
    SpriteInstance, SpriteRenderer, StripInstance, StripPoint, StripRenderer, TrackInstance,
    TrackRenderer,
};
pub use render_state::{AlphaBlendType, CullingType, RenderMode, RenderState};
pub use renderer::{Renderer, ShaderFamily, ShaderKey};
pub use shader::{Shader, ShaderType};
pub use standard::StandardState;
pub use texture::{Texture, TextureLoader, TextureType};
pub use vertex::{ModelVertex, PrimitiveVertex};
