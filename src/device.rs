//! Graphics device facade.
//!
//! The [`GraphicsDevice`] is what effect content uses to create its own GPU
//! resources: proxy textures, model vertex/index buffers and vertex layouts.
//! It wraps the native capability table and tracks the resources it handed
//! out with weak references.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{IndexStride, NativeGraphics, NativeVertexLayout, TextureFormat};
use crate::buffers::{StaticIndexBuffer, StaticVertexBuffer};
use crate::error::{RendererError, RendererResult};
use crate::layout::{VertexLayout, VertexLayoutElement};
use crate::texture::Texture;

/// Description of a texture to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParameter {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureParameter {
    pub fn rgba8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    /// Bytes of initial data this texture needs.
    pub fn data_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

/// Resource factory over the native graphics API.
pub struct GraphicsDevice {
    native: Arc<dyn NativeGraphics>,
    model_layout: NativeVertexLayout,
    textures: RwLock<Vec<Weak<Texture>>>,
    vertex_buffers: RwLock<Vec<Weak<StaticVertexBuffer>>>,
    index_buffers: RwLock<Vec<Weak<StaticIndexBuffer>>>,
}

impl GraphicsDevice {
    pub fn new(native: Arc<dyn NativeGraphics>) -> RendererResult<Self> {
        Ok(Self {
            native,
            model_layout: VertexLayout::model().translate()?,
            textures: RwLock::new(Vec::new()),
            vertex_buffers: RwLock::new(Vec::new()),
            index_buffers: RwLock::new(Vec::new()),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        self.native.name()
    }

    pub fn native(&self) -> &Arc<dyn NativeGraphics> {
        &self.native
    }

    /// Layout static model vertex buffers are created with.
    pub fn model_layout(&self) -> &NativeVertexLayout {
        &self.model_layout
    }

    /// Create a 2D texture from initial data.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, the data doesn't match the size,
    /// or the native allocation fails.
    pub fn create_texture(
        &self,
        param: &TextureParameter,
        data: &[u8],
    ) -> RendererResult<Arc<Texture>> {
        if param.width == 0 || param.height == 0 {
            return Err(RendererError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        if data.len() != param.data_size() {
            return Err(RendererError::InvalidParameter(format!(
                "texture data is {} bytes, expected {}",
                data.len(),
                param.data_size()
            )));
        }

        let handle =
            self.native
                .create_texture_2d(param.width, param.height, param.format, data)?;
        let texture = Arc::new(Texture::native(
            self.native.clone(),
            handle,
            param.width,
            param.height,
        ));
        self.textures.write().push(Arc::downgrade(&texture));

        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}",
            handle,
            param.width,
            param.height
        );
        Ok(texture)
    }

    /// Create an immutable model vertex buffer.
    ///
    /// Dynamic buffers aren't supported: dynamic geometry goes through the
    /// renderer's transient buffer.
    pub fn create_vertex_buffer(
        &self,
        data: &[u8],
        dynamic: bool,
    ) -> RendererResult<Arc<StaticVertexBuffer>> {
        if dynamic {
            return Err(RendererError::Unsupported("dynamic vertex buffers"));
        }
        if data.is_empty() {
            return Err(RendererError::InvalidParameter(
                "vertex buffer size cannot be zero".to_string(),
            ));
        }

        let buffer = StaticVertexBuffer::new(self.native.clone(), data, &self.model_layout)?;
        self.vertex_buffers.write().push(Arc::downgrade(&buffer));

        log::trace!("GraphicsDevice: created vertex buffer, size={}", data.len());
        Ok(buffer)
    }

    /// Create an immutable index buffer of `count` indices.
    pub fn create_index_buffer(
        &self,
        count: usize,
        data: &[u8],
        stride: IndexStride,
    ) -> RendererResult<Arc<StaticIndexBuffer>> {
        if data.len() != count * stride.bytes() {
            return Err(RendererError::InvalidParameter(format!(
                "index data is {} bytes, expected {count} x {}",
                data.len(),
                stride.bytes()
            )));
        }

        let buffer = StaticIndexBuffer::from_bytes(self.native.clone(), data, stride)?;
        self.index_buffers.write().push(Arc::downgrade(&buffer));

        log::trace!("GraphicsDevice: created index buffer, count={count}");
        Ok(buffer)
    }

    /// Build a vertex layout, rejecting unknown semantics up front.
    pub fn create_vertex_layout(
        &self,
        elements: &[VertexLayoutElement],
    ) -> RendererResult<Arc<VertexLayout>> {
        let layout = VertexLayout::new(elements.to_vec());
        layout.translate()?;
        Ok(Arc::new(layout))
    }

    /// Get the number of live textures created by this device.
    pub fn texture_count(&self) -> usize {
        self.textures
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Get the number of live static buffers created by this device.
    pub fn buffer_count(&self) -> usize {
        let vertex = self
            .vertex_buffers
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count();
        let index = self
            .index_buffers
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count();
        vertex + index
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name())
            .field("textures", &self.texture_count())
            .field("buffers", &self.buffer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingGraphics;
    use crate::layout::VertexLayoutFormat;

    fn device() -> (Arc<RecordingGraphics>, GraphicsDevice) {
        let native = Arc::new(RecordingGraphics::new());
        let device = GraphicsDevice::new(native.clone()).unwrap();
        (native, device)
    }

    #[test]
    fn test_device_name() {
        let (_, device) = device();
        assert_eq!(device.name(), "Recording");
    }

    #[test]
    fn test_texture_tracking() {
        let (native, device) = device();
        let texture = device
            .create_texture(&TextureParameter::rgba8(2, 2), &[255; 16])
            .unwrap();
        assert_eq!(device.texture_count(), 1);
        assert_eq!(texture.width(), 2);

        drop(texture);
        assert_eq!(device.texture_count(), 0);
        assert_eq!(native.live_textures(), 0);
    }

    #[test]
    fn test_texture_validation() {
        let (_, device) = device();
        assert!(device
            .create_texture(&TextureParameter::rgba8(0, 4), &[])
            .is_err());
        assert!(device
            .create_texture(&TextureParameter::rgba8(2, 2), &[0; 15])
            .is_err());
    }

    #[test]
    fn test_dynamic_vertex_buffer_is_unsupported() {
        let (_, device) = device();
        assert_eq!(
            device.create_vertex_buffer(&[0; 60], true).err(),
            Some(RendererError::Unsupported("dynamic vertex buffers"))
        );
        assert!(device.create_vertex_buffer(&[0; 60], false).is_ok());
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        let (native, device) = device();
        native.set_fail_allocations(true);
        assert!(matches!(
            device.create_index_buffer(3, &[0; 6], IndexStride::U16),
            Err(RendererError::Backend(_))
        ));
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_vertex_layout_rejects_unknown_semantic() {
        let (_, device) = device();
        let elements = [VertexLayoutElement::new(
            VertexLayoutFormat::R32G32Float,
            "BINORMAL",
            0,
        )];
        assert!(matches!(
            device.create_vertex_layout(&elements),
            Err(RendererError::UnknownSemantic { .. })
        ));
    }
}
