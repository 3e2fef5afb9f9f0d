//! Texture handles and the host-backed texture loader.

use std::sync::Arc;

use crate::backend::{BackendError, HostCallbacks, NativeGraphics, TextureHandle};
use crate::error::RendererResult;

/// Kind of texture an effect references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// Color data, loaded as sRGB.
    Color,
    Normal,
    Distortion,
}

enum Release {
    /// Created by the renderer on the native device.
    Native(Arc<dyn NativeGraphics>),
    /// Loaded through the host callbacks.
    Host(Arc<dyn HostCallbacks>),
}

/// A native texture, released exactly once when the last `Arc` drops.
pub struct Texture {
    handle: TextureHandle,
    width: u32,
    height: u32,
    release: Release,
}

impl Texture {
    pub(crate) fn native(
        native: Arc<dyn NativeGraphics>,
        handle: TextureHandle,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            handle,
            width,
            height,
            release: Release::Native(native),
        }
    }

    pub(crate) fn host(host: Arc<dyn HostCallbacks>, handle: TextureHandle) -> Self {
        Self {
            handle,
            width: 0,
            height: 0,
            release: Release::Host(host),
        }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    /// Width in pixels, 0 if the host didn't report it.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels, 0 if the host didn't report it.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        match &self.release {
            Release::Native(native) => native.destroy_texture(self.handle),
            Release::Host(host) => host.unload_texture(self.handle),
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owner = match self.release {
            Release::Native(_) => "native",
            Release::Host(_) => "host",
        };
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("owner", &owner)
            .finish()
    }
}

/// Loads effect textures through the host callbacks.
pub struct TextureLoader {
    host: Arc<dyn HostCallbacks>,
}

impl TextureLoader {
    pub fn new(host: Arc<dyn HostCallbacks>) -> Self {
        Self { host }
    }

    /// Load `path`. Color textures are requested as sRGB.
    pub fn load(&self, path: &str, ty: TextureType) -> RendererResult<Arc<Texture>> {
        let srgb = ty == TextureType::Color;
        let handle = self
            .host
            .load_texture(path, srgb)
            .ok_or_else(|| BackendError::TextureCreationFailed(path.to_string()))?;
        log::debug!("Loaded texture {path} as {handle:?} (srgb: {srgb})");
        Ok(Arc::new(Texture::host(self.host.clone(), handle)))
    }

    /// Give up one handle to a texture.
    ///
    /// This releases nothing itself. The host unload runs when the last
    /// `Arc<Texture>` drops, so it happens here only if `texture` was the
    /// last handle; otherwise it waits for the remaining clones.
    pub fn unload(&self, texture: Arc<Texture>) {
        if Arc::strong_count(&texture) > 1 {
            log::trace!("Texture {:?} still referenced, deferring unload", texture.handle);
        }
    }
}

impl std::fmt::Debug for TextureLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{CatalogHost, RecordingGraphics};
    use crate::error::RendererError;

    #[test]
    fn test_color_textures_load_as_srgb() {
        let native = Arc::new(RecordingGraphics::new());
        let host = Arc::new(CatalogHost::new(native.clone()));
        let loader = TextureLoader::new(host.clone());

        let _color = loader.load("fire.png", TextureType::Color).unwrap();
        let _normal = loader.load("fire_n.png", TextureType::Normal).unwrap();

        assert_eq!(
            host.loaded_paths(),
            vec![
                ("fire.png".to_string(), true),
                ("fire_n.png".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_unload_releases_once_after_last_reference() {
        let native = Arc::new(RecordingGraphics::new());
        let host = Arc::new(CatalogHost::new(native.clone()));
        let loader = TextureLoader::new(host.clone());

        let texture = loader.load("smoke.png", TextureType::Color).unwrap();
        let in_use = texture.clone();

        loader.unload(texture);
        assert!(host.unloaded().is_empty());

        drop(in_use);
        assert_eq!(host.unloaded().len(), 1);
        assert_eq!(native.live_textures(), 0);

        // Sole handle: released by the call.
        let sole = loader.load("spark.png", TextureType::Color).unwrap();
        loader.unload(sole);
        assert_eq!(host.unloaded().len(), 2);
    }

    #[test]
    fn test_failed_load_is_typed() {
        let native = Arc::new(RecordingGraphics::new());
        let host = Arc::new(CatalogHost::new(native.clone()));
        let loader = TextureLoader::new(host);

        native.set_fail_allocations(true);
        assert_eq!(
            loader.load("missing.png", TextureType::Color).err(),
            Some(RendererError::Backend(BackendError::TextureCreationFailed(
                "missing.png".to_string()
            )))
        );
    }
}
