use bytes::BytesMut;
use std::collections::VecDeque;

use super::video::VideoInfo;

/// Caller-owned memory for one raw output picture, laid out per its [`VideoInfo`].
///
/// The backing allocation is over-sized so that the first plane can start on
/// an arbitrary power-of-two boundary. This is what lets the decoder engine
/// write straight into the buffer when it demands aligned planes.
pub struct OutputBuffer {
    data: BytesMut,
    base: usize,
    info: VideoInfo,
}

impl OutputBuffer {
    pub fn new(info: VideoInfo) -> Self {
        Self::with_base_alignment(info, 1)
    }

    pub fn with_base_alignment(info: VideoInfo, align: usize) -> Self {
        let align = align.max(1);
        let data = BytesMut::zeroed(info.size() + align - 1);
        let addr = data.as_ptr() as usize;
        let base = (align - addr % align) % align;
        Self { data, base, info }
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Bytes of `plane`, from its first row to the end of its last row.
    ///
    /// # Panics
    ///
    /// Panics if `plane` is not a plane of this buffer's format.
    pub fn plane(&self, plane: usize) -> &[u8] {
        let range = self.plane_range(plane);
        &self.data[range]
    }

    /// Mutable variant of [`OutputBuffer::plane`].
    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        let range = self.plane_range(plane);
        &mut self.data[range]
    }

    /// Address of the first byte of `plane`, for alignment checks.
    pub fn plane_address(&self, plane: usize) -> usize {
        self.data.as_ptr() as usize + self.base + self.info.offset(plane)
    }

    fn plane_range(&self, plane: usize) -> std::ops::Range<usize> {
        assert!(plane < self.info.n_planes(), "plane {} out of range", plane);
        let start = self.base + self.info.offset(plane);
        start..start + self.info.stride(plane) * self.info.plane_height(plane) as usize
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("info", &self.info)
            .field("base", &self.base)
            .finish()
    }
}

/// A pool of reusable output buffers sharing one layout.
///
/// Acquiring with a different layout than the pooled one empties the pool.
pub struct BufferPool {
    available: VecDeque<OutputBuffer>,
    info: Option<VideoInfo>,
    base_align: usize,
    max_size: usize,
}

impl BufferPool {
    pub fn new(max_size: usize, base_align: usize) -> Self {
        Self {
            available: VecDeque::with_capacity(max_size),
            info: None,
            base_align,
            max_size,
        }
    }

    /// Returns a pooled buffer for `info` if one is free, otherwise allocates.
    pub fn acquire(&mut self, info: &VideoInfo) -> OutputBuffer {
        if self.info.as_ref() != Some(info) {
            self.available.clear();
            self.info = Some(info.clone());
        }
        self.available
            .pop_front()
            .unwrap_or_else(|| OutputBuffer::with_base_alignment(info.clone(), self.base_align))
    }

    /// Hands a buffer back. Buffers of a stale layout, or beyond the pool
    /// capacity, are dropped.
    pub fn release(&mut self, buffer: OutputBuffer) {
        if self.available.len() < self.max_size && self.info.as_ref() == Some(buffer.info()) {
            self.available.push_back(buffer);
        }
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}
