//! Vertex and index buffers.
//!
//! Dynamic primitives stream their vertices through one
//! [`TransientVertexBuffer`] per renderer. It is backed by native transient
//! storage that is allocated at the start of each frame and is only valid
//! until the frame ends. Within a frame, writers take consecutive regions with
//! [`TransientVertexBuffer::ring_buffer_lock`], write into the returned slice
//! and hand the bytes to the native side with
//! [`TransientVertexBuffer::unlock`]. Only one lock may be held at a time.
//!
//! Model geometry lives in [`StaticVertexBuffer`] / [`StaticIndexBuffer`],
//! created once from initial data and shared through `Arc`. The native
//! buffer is released when the last reference drops.

use std::sync::Arc;

use crate::backend::{
    IndexBufferHandle, IndexStride, NativeGraphics, NativeVertexLayout,
    TransientVertexBufferHandle, VertexBufferHandle,
};
use crate::error::{RendererError, RendererResult};
use crate::layout::{max_sprite_stride, min_sprite_stride};

/// Index pattern of one sprite quad, relative to its first vertex.
pub const QUAD_INDICES: [u32; 6] = [3, 1, 0, 3, 0, 2];

/// A region of the transient buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAllocation {
    /// Byte offset into the buffer.
    pub offset: usize,
    /// Size of the region in bytes.
    pub size: usize,
}

impl RingAllocation {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Per-frame vertex scratch storage with single-writer locking.
pub struct TransientVertexBuffer {
    native: Arc<dyn NativeGraphics>,
    layout: NativeVertexLayout,
    num_vertices: u32,
    staging: Vec<u8>,
    handle: Option<TransientVertexBufferHandle>,
    write_offset: usize,
    locked: Option<RingAllocation>,
}

impl TransientVertexBuffer {
    /// Room for `num_vertices` vertices of `layout`.
    pub fn new(native: Arc<dyn NativeGraphics>, num_vertices: u32, layout: NativeVertexLayout) -> Self {
        let capacity = num_vertices as usize * layout.stride as usize;
        Self {
            native,
            layout,
            num_vertices,
            staging: vec![0; capacity],
            handle: None,
            write_offset: 0,
            locked: None,
        }
    }

    /// Allocate this frame's native storage and rewind the ring.
    pub fn begin_frame(&mut self) -> RendererResult<()> {
        let handle = self
            .native
            .alloc_transient_vertex_buffer(self.num_vertices, &self.layout)?;
        self.handle = Some(handle);
        self.write_offset = 0;
        Ok(())
    }

    /// Drop this frame's native storage. Its content must not be used after.
    pub fn end_frame(&mut self) {
        if self.locked.take().is_some() {
            log::warn!("Transient vertex buffer still locked at end of frame");
        }
        self.handle = None;
        self.write_offset = 0;
    }

    /// Native storage of the current frame.
    pub fn handle(&self) -> Option<TransientVertexBufferHandle> {
        self.handle
    }

    pub fn native_layout(&self) -> &NativeVertexLayout {
        &self.layout
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.staging.len()
    }

    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    /// Bytes left before the ring is exhausted.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.write_offset
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Lock the whole buffer, discarding everything written this frame.
    pub fn lock(&mut self) -> RendererResult<&mut [u8]> {
        self.check_lockable()?;
        self.write_offset = 0;
        let allocation = RingAllocation::new(0, self.capacity());
        self.locked = Some(allocation);
        Ok(&mut self.staging[..])
    }

    /// Lock the next `size` bytes, aligned to `alignment`.
    ///
    /// Returns the region's byte offset and the slice to fill.
    pub fn ring_buffer_lock(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> RendererResult<(usize, &mut [u8])> {
        self.check_lockable()?;
        let Some(allocation) = self.allocate(size, alignment) else {
            return Err(RendererError::TransientBufferFull {
                requested: size,
                remaining: self.remaining(),
            });
        };
        self.write_offset = allocation.end();
        self.locked = Some(allocation);
        Ok((
            allocation.offset,
            &mut self.staging[allocation.offset..allocation.end()],
        ))
    }

    /// Like [`Self::ring_buffer_lock`], but a full ring is `Ok(None)`.
    pub fn try_ring_buffer_lock(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> RendererResult<Option<(usize, &mut [u8])>> {
        self.check_lockable()?;
        if self.allocate(size, alignment).is_none() {
            return Ok(None);
        }
        self.ring_buffer_lock(size, alignment).map(Some)
    }

    /// Release the lock and upload the locked region.
    pub fn unlock(&mut self) -> RendererResult<()> {
        let allocation = self.locked.take().ok_or(RendererError::VertexBufferNotLocked)?;
        let handle = self.handle.ok_or(RendererError::FrameNotStarted)?;
        if allocation.size > 0 {
            self.native.update_transient_vertex_buffer(
                handle,
                allocation.offset,
                &self.staging[allocation.offset..allocation.end()],
            );
        }
        Ok(())
    }

    fn check_lockable(&self) -> RendererResult<()> {
        if self.locked.is_some() {
            return Err(RendererError::VertexBufferAlreadyLocked);
        }
        if self.handle.is_none() {
            return Err(RendererError::FrameNotStarted);
        }
        Ok(())
    }

    fn allocate(&self, size: usize, alignment: usize) -> Option<RingAllocation> {
        let offset = align_up(self.write_offset, alignment.max(1));
        let end = offset.checked_add(size)?;
        (end <= self.capacity()).then(|| RingAllocation::new(offset, size))
    }
}

impl std::fmt::Debug for TransientVertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientVertexBuffer")
            .field("capacity", &self.capacity())
            .field("write_offset", &self.write_offset)
            .field("handle", &self.handle)
            .field("locked", &self.locked)
            .finish()
    }
}

/// Align a value up to the given alignment.
#[inline]
fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Immutable GPU vertex storage.
pub struct StaticVertexBuffer {
    native: Arc<dyn NativeGraphics>,
    handle: VertexBufferHandle,
    size: usize,
}

impl StaticVertexBuffer {
    pub fn new(
        native: Arc<dyn NativeGraphics>,
        data: &[u8],
        layout: &NativeVertexLayout,
    ) -> RendererResult<Arc<Self>> {
        let handle = native.create_vertex_buffer(data, layout)?;
        Ok(Arc::new(Self {
            native,
            handle,
            size: data.len(),
        }))
    }

    pub fn handle(&self) -> VertexBufferHandle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Static buffers can't be updated.
    pub fn update_data(&self, _data: &[u8], _offset: usize) -> RendererResult<()> {
        Err(RendererError::ImmutableBuffer)
    }
}

impl Drop for StaticVertexBuffer {
    fn drop(&mut self) {
        log::trace!("Releasing vertex buffer {:?}", self.handle);
        self.native.destroy_vertex_buffer(self.handle);
    }
}

impl std::fmt::Debug for StaticVertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticVertexBuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish()
    }
}

/// Immutable GPU index storage.
pub struct StaticIndexBuffer {
    native: Arc<dyn NativeGraphics>,
    handle: IndexBufferHandle,
    stride: IndexStride,
    count: usize,
}

impl StaticIndexBuffer {
    /// Create from indices, encoding them with `stride`.
    pub fn new(
        native: Arc<dyn NativeGraphics>,
        indices: &[u32],
        stride: IndexStride,
    ) -> RendererResult<Arc<Self>> {
        let bytes = encode_indices(indices, stride)?;
        Self::from_bytes(native, &bytes, stride)
    }

    /// Create from already encoded index bytes.
    pub fn from_bytes(
        native: Arc<dyn NativeGraphics>,
        bytes: &[u8],
        stride: IndexStride,
    ) -> RendererResult<Arc<Self>> {
        let handle = native.create_index_buffer(bytes, stride)?;
        Ok(Arc::new(Self {
            native,
            handle,
            stride,
            count: bytes.len() / stride.bytes(),
        }))
    }

    /// Shared quad index buffer sized for `square_max_count`.
    pub fn sprites(native: Arc<dyn NativeGraphics>, square_max_count: u32) -> RendererResult<Arc<Self>> {
        let sprites = index_sprite_count(square_max_count);
        let stride = index_stride(sprites);
        log::debug!("Sprite index buffer: {sprites} quads, {stride:?}");
        Self::new(native, &sprite_indices(sprites), stride)
    }

    pub fn handle(&self) -> IndexBufferHandle {
        self.handle
    }

    pub fn stride(&self) -> IndexStride {
        self.stride
    }

    /// Number of indices.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Static buffers can't be updated.
    pub fn update_data(&self, _data: &[u8], _offset: usize) -> RendererResult<()> {
        Err(RendererError::ImmutableBuffer)
    }
}

impl Drop for StaticIndexBuffer {
    fn drop(&mut self) {
        log::trace!("Releasing index buffer {:?}", self.handle);
        self.native.destroy_index_buffer(self.handle);
    }
}

impl std::fmt::Debug for StaticIndexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIndexBuffer")
            .field("handle", &self.handle)
            .field("stride", &self.stride)
            .field("count", &self.count)
            .finish()
    }
}

/// Quads the sprite index buffer must cover.
///
/// Enough for the transient buffer filled entirely with the narrowest vertex
/// type, since draws can only offset into the index buffer.
pub fn index_sprite_count(square_max_count: u32) -> u32 {
    let bytes = u64::from(max_sprite_stride()) * u64::from(square_max_count) * 4;
    let sprites = bytes / u64::from(min_sprite_stride()) / 4 + 1;
    u32::try_from(sprites).unwrap_or(u32::MAX)
}

/// 16-bit indices unless the highest vertex index doesn't fit.
pub fn index_stride(sprite_count: u32) -> IndexStride {
    if u64::from(sprite_count) * 4 > 65536 {
        IndexStride::U32
    } else {
        IndexStride::U16
    }
}

/// Indices of `sprite_count` consecutive quads.
pub fn sprite_indices(sprite_count: u32) -> Vec<u32> {
    (0..sprite_count)
        .flat_map(|quad| QUAD_INDICES.iter().map(move |i| i + 4 * quad))
        .collect()
}

/// Encode indices as little-endian bytes of the given width.
pub fn encode_indices(indices: &[u32], stride: IndexStride) -> RendererResult<Vec<u8>> {
    match stride {
        IndexStride::U32 => Ok(bytemuck::cast_slice(indices).to_vec()),
        IndexStride::U16 => {
            let narrow = indices
                .iter()
                .map(|i| {
                    u16::try_from(*i).map_err(|_| {
                        RendererError::InvalidParameter(format!("index {i} exceeds 16 bits"))
                    })
                })
                .collect::<RendererResult<Vec<u16>>>()?;
            Ok(bytemuck::cast_slice(&narrow).to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{NativeCall, RecordingGraphics};
    use crate::backend::{Attrib, AttribType};

    fn layout() -> NativeVertexLayout {
        let mut layout = NativeVertexLayout::new();
        layout.add(Attrib::Position, 4, AttribType::Float, false, false);
        layout
    }

    fn transient(native: &Arc<RecordingGraphics>) -> TransientVertexBuffer {
        // 16 vertices x 16 bytes
        TransientVertexBuffer::new(native.clone(), 16, layout())
    }

    #[test]
    fn test_lock_requires_frame() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        assert_eq!(buffer.lock().err(), Some(RendererError::FrameNotStarted));
    }

    #[test]
    fn test_double_lock_is_rejected() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        buffer.begin_frame().unwrap();

        buffer.lock().unwrap();
        assert_eq!(
            buffer.lock().err(),
            Some(RendererError::VertexBufferAlreadyLocked)
        );
        assert_eq!(
            buffer.ring_buffer_lock(16, 4).err(),
            Some(RendererError::VertexBufferAlreadyLocked)
        );

        buffer.unlock().unwrap();
        assert!(!buffer.is_locked());
        assert!(buffer.lock().is_ok());
    }

    #[test]
    fn test_unlock_without_lock() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        buffer.begin_frame().unwrap();
        assert_eq!(buffer.unlock(), Err(RendererError::VertexBufferNotLocked));
    }

    #[test]
    fn test_ring_lock_advances_and_uploads() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        buffer.begin_frame().unwrap();
        let handle = buffer.handle().unwrap();

        let (offset, data) = buffer.ring_buffer_lock(20, 1).unwrap();
        assert_eq!(offset, 0);
        data.fill(7);
        buffer.unlock().unwrap();

        // aligned up from 20
        let (offset, data) = buffer.ring_buffer_lock(8, 16).unwrap();
        assert_eq!(offset, 32);
        data.fill(9);
        buffer.unlock().unwrap();

        let stored = native.transient_data(handle).unwrap();
        assert_eq!(&stored[..20], &[7; 20]);
        assert_eq!(&stored[32..40], &[9; 8]);
        assert_eq!(buffer.write_offset(), 40);
    }

    #[test]
    fn test_ring_exhaustion() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        buffer.begin_frame().unwrap();

        buffer.ring_buffer_lock(250, 1).unwrap();
        buffer.unlock().unwrap();

        assert!(buffer.try_ring_buffer_lock(8, 1).unwrap().is_none());
        assert!(!buffer.is_locked());
        assert_eq!(
            buffer.ring_buffer_lock(8, 1).err(),
            Some(RendererError::TransientBufferFull {
                requested: 8,
                remaining: 6
            })
        );
    }

    #[test]
    fn test_frame_rewinds_ring() {
        let native = Arc::new(RecordingGraphics::new());
        let mut buffer = transient(&native);
        buffer.begin_frame().unwrap();
        buffer.ring_buffer_lock(64, 1).unwrap();
        buffer.unlock().unwrap();
        buffer.end_frame();
        assert!(buffer.handle().is_none());

        buffer.begin_frame().unwrap();
        assert_eq!(buffer.write_offset(), 0);
        let allocs = native
            .calls()
            .iter()
            .filter(|c| matches!(c, NativeCall::AllocTransientVertexBuffer { .. }))
            .count();
        assert_eq!(allocs, 2);
    }

    #[test]
    fn test_static_buffers_release_once() {
        let native = Arc::new(RecordingGraphics::new());
        let vb = StaticVertexBuffer::new(native.clone(), &[0; 32], &layout()).unwrap();
        let ib = StaticIndexBuffer::new(native.clone(), &[0, 1, 2], IndexStride::U16).unwrap();
        let shared = vb.clone();

        assert_eq!(vb.update_data(&[1], 0), Err(RendererError::ImmutableBuffer));
        assert_eq!(ib.update_data(&[1], 0), Err(RendererError::ImmutableBuffer));
        assert_eq!(ib.count(), 3);

        drop(vb);
        assert_eq!(native.live_vertex_buffers(), 1);
        drop(shared);
        drop(ib);
        assert_eq!(native.live_vertex_buffers(), 0);
        assert_eq!(native.live_index_buffers(), 0);

        let destroys = native
            .calls()
            .iter()
            .filter(|c| matches!(c, NativeCall::DestroyVertexBuffer(_)))
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn test_sprite_index_pattern() {
        let indices = sprite_indices(3);
        assert_eq!(indices.len(), 18);
        for (quad, chunk) in indices.chunks(6).enumerate() {
            let expected: Vec<u32> = QUAD_INDICES.iter().map(|i| i + 4 * quad as u32).collect();
            assert_eq!(chunk, expected.as_slice());
        }
    }

    #[test]
    fn test_index_sizing() {
        assert_eq!(index_sprite_count(100), 367);
        assert_eq!(index_stride(367), IndexStride::U16);
        assert_eq!(index_stride(16384), IndexStride::U16);
        assert_eq!(index_stride(16385), IndexStride::U32);
        // 8000 squares need more than 16 bits
        assert_eq!(index_stride(index_sprite_count(8000)), IndexStride::U32);
    }

    #[test]
    fn test_encode_rejects_wide_index() {
        assert!(encode_indices(&[70000], IndexStride::U16).is_err());
        assert_eq!(
            encode_indices(&[1, 2], IndexStride::U16).unwrap(),
            vec![1, 0, 2, 0]
        );
        assert_eq!(encode_indices(&[1], IndexStride::U32).unwrap().len(), 4);
    }
}
