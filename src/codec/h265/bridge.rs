//! Direct rendering: lets the engine decode into caller-owned output buffers.
//!
//! [`DirectRenderAllocator`] is installed as the engine's [`PlaneAllocator`].
//! For every picture it tries to borrow an [`OutputBuffer`] from the host and
//! hand its planes to the engine. When the picture cannot be written in place
//! (cropping, mixed bit depths, a layout the engine cannot use) it falls back
//! to the engine's own [`DefaultAllocator`] and the picture is copied out later.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::av::{BufferPool, OutputBuffer, VideoFormat, VideoInfo};
use crate::error::{Notice, Result};

use super::format::{video_format_for, OutputNegotiator, OutputState};
use super::frames::FrameTracker;
use super::picture::{
    ChromaFormat, DecodedPicture, DefaultAllocator, ImageSpec, PlaneAllocator, PlaneStorage,
};

/// The downstream side of the decoder: negotiates output descriptions and
/// supplies output buffers.
pub trait OutputHost: Send {
    /// Called whenever the output geometry changes, before buffers of the new
    /// layout are requested.
    fn negotiate(&mut self, state: &OutputState) -> Result<()>;

    /// Allocates a buffer for one picture. The returned buffer's own
    /// [`VideoInfo`] describes its actual layout and may use larger strides
    /// than `info`.
    fn allocate_output_buffer(&mut self, info: &VideoInfo) -> Result<OutputBuffer>;

    /// Takes back a buffer that was allocated but never emitted.
    fn release_output_buffer(&mut self, buffer: OutputBuffer) {
        drop(buffer);
    }
}

/// An [`OutputHost`] backed by a [`BufferPool`].
///
/// Buffers are laid out with every stride and plane start aligned to
/// `alignment` bytes, which is what the engine needs to decode into them.
pub struct PooledOutput {
    pool: BufferPool,
    alignment: usize,
    state: Option<OutputState>,
}

impl PooledOutput {
    pub const DEFAULT_POOL_SIZE: usize = 8;
    pub const DEFAULT_ALIGNMENT: usize = 16;

    pub fn new() -> Self {
        Self::with_alignment(Self::DEFAULT_POOL_SIZE, Self::DEFAULT_ALIGNMENT)
    }

    pub fn with_alignment(pool_size: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1);
        Self {
            pool: BufferPool::new(pool_size, alignment),
            alignment,
            state: None,
        }
    }

    /// The last negotiated output description.
    pub fn state(&self) -> Option<&OutputState> {
        self.state.as_ref()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Default for PooledOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputHost for PooledOutput {
    fn negotiate(&mut self, state: &OutputState) -> Result<()> {
        log::debug!(
            "Negotiated {} {}x{} @ {}",
            state.info.format,
            state.info.width,
            state.info.height,
            state.framerate
        );
        self.state = Some(state.clone());
        Ok(())
    }

    fn allocate_output_buffer(&mut self, info: &VideoInfo) -> Result<OutputBuffer> {
        let info = VideoInfo::with_alignment(info.format, info.width, info.height, self.alignment);
        Ok(self.pool.acquire(&info))
    }

    fn release_output_buffer(&mut self, buffer: OutputBuffer) {
        self.pool.release(buffer);
    }
}

/// State shared between the decoder and the allocator living inside the engine.
///
/// Never held across a call into the engine: the engine calls back into the
/// allocator, which takes the same lock.
pub(crate) struct Shared {
    pub(crate) host: Box<dyn OutputHost>,
    pub(crate) tracker: FrameTracker,
    pub(crate) negotiator: OutputNegotiator,
    pub(crate) notices: Vec<Notice>,
}

pub(crate) type SharedState = Arc<Mutex<Shared>>;

pub(crate) fn new_shared(host: Box<dyn OutputHost>) -> SharedState {
    Arc::new(Mutex::new(Shared {
        host,
        tracker: FrameTracker::new(),
        negotiator: OutputNegotiator::new(),
        notices: Vec::new(),
    }))
}

/// Ties a direct-rendered picture to its frame and output buffer.
///
/// Exactly one exists per direct-rendered picture. Releasing consumes it, and
/// a buffer that was never taken for emission goes back to the host.
pub struct FrameRef {
    system_frame_number: u32,
    buffer: Option<OutputBuffer>,
    shared: SharedState,
}

impl FrameRef {
    pub fn system_frame_number(&self) -> u32 {
        self.system_frame_number
    }

    pub fn plane(&self, plane: usize) -> Option<(&[u8], usize)> {
        let buffer = self.buffer.as_ref()?;
        if plane >= buffer.info().n_planes() {
            return None;
        }
        Some((buffer.plane(plane), buffer.info().stride(plane)))
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<(&mut [u8], usize)> {
        let buffer = self.buffer.as_mut()?;
        if plane >= buffer.info().n_planes() {
            return None;
        }
        let stride = buffer.info().stride(plane);
        Some((buffer.plane_mut(plane), stride))
    }

    /// Moves the filled buffer out for emission.
    pub fn take_buffer(&mut self) -> Option<OutputBuffer> {
        self.buffer.take()
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for FrameRef {
    // Must not run while the shared state is locked.
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.shared.lock().host.release_output_buffer(buffer);
        }
    }
}

impl fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("system_frame_number", &self.system_frame_number)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Why a picture could not be rendered directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoCurrentFrame,
    Cropped {
        width: u32,
        height: u32,
        visible_width: u32,
        visible_height: u32,
    },
    MixedBitDepth([u8; 3]),
    UnsupportedFormat {
        chroma: ChromaFormat,
        bits_per_pixel: u8,
    },
    BitDepthMismatch {
        format: VideoFormat,
        bits_per_pixel: u8,
    },
    Negotiation(String),
    Allocation(String),
    Layout {
        plane: usize,
        detail: String,
    },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoCurrentFrame => write!(f, "no codec frame for the current picture"),
            FallbackReason::Cropped {
                width,
                height,
                visible_width,
                visible_height,
            } => write!(
                f,
                "cropping required ({}x{} visible of {}x{})",
                visible_width, visible_height, width, height
            ),
            FallbackReason::MixedBitDepth(bits) => write!(
                f,
                "input format has multiple bits per pixel ({}/{}/{})",
                bits[0], bits[1], bits[2]
            ),
            FallbackReason::UnsupportedFormat {
                chroma,
                bits_per_pixel,
            } => write!(
                f,
                "no output format for {:?} at {} bits per pixel",
                chroma, bits_per_pixel
            ),
            FallbackReason::BitDepthMismatch {
                format,
                bits_per_pixel,
            } => write!(
                f,
                "output format doesn't provide enough bits per pixel ({}/{})",
                format.bits(),
                bits_per_pixel
            ),
            FallbackReason::Negotiation(msg) => write!(f, "negotiation failed: {}", msg),
            FallbackReason::Allocation(msg) => write!(f, "allocation failed: {}", msg),
            FallbackReason::Layout { plane, detail } => write!(f, "plane {}: {}", plane, detail),
        }
    }
}

/// The [`PlaneAllocator`] installed into the engine.
pub struct DirectRenderAllocator {
    shared: SharedState,
    fallback: DefaultAllocator,
}

impl DirectRenderAllocator {
    pub(crate) fn new(shared: SharedState) -> Self {
        Self {
            shared,
            fallback: DefaultAllocator,
        }
    }

    fn try_direct(
        &mut self,
        spec: &ImageSpec,
        picture: &DecodedPicture,
    ) -> std::result::Result<FrameRef, FallbackReason> {
        let mut guard = self.shared.lock();
        let Shared {
            host,
            tracker,
            negotiator,
            notices,
        } = &mut *guard;

        let current = tracker.current();
        let system_frame_number = match current.and_then(|number| tracker.get(number)) {
            Some(frame) => frame.system_frame_number,
            None => {
                log::warn!("Couldn't get codec frame");
                return Err(FallbackReason::NoCurrentFrame);
            }
        };

        let width = spec.aligned_width();
        let height = spec.height;
        if width != spec.visible_width || height != spec.visible_height {
            return Err(FallbackReason::Cropped {
                width,
                height,
                visible_width: spec.visible_width,
                visible_height: spec.visible_height,
            });
        }

        let bits = [
            picture.bits_per_pixel(0),
            picture.bits_per_pixel(1),
            picture.bits_per_pixel(2),
        ];
        if spec.chroma != ChromaFormat::Mono && (bits[0] != bits[1] || bits[0] != bits[2]) {
            return Err(FallbackReason::MixedBitDepth(bits));
        }

        let format = video_format_for(spec.chroma, bits[0]);
        if format == VideoFormat::Unknown {
            return Err(FallbackReason::UnsupportedFormat {
                chroma: spec.chroma,
                bits_per_pixel: bits[0],
            });
        }
        if format.bits() != bits[0] {
            return Err(FallbackReason::BitDepthMismatch {
                format,
                bits_per_pixel: bits[0],
            });
        }

        match negotiator.image_available(&mut **host, format, width, height) {
            Ok(Some(notice)) => notices.push(notice),
            Ok(None) => {}
            Err(e) => {
                log::error!("Failed to notify about available image: {}", e);
                return Err(FallbackReason::Negotiation(e.to_string()));
            }
        }
        let info = match negotiator.state() {
            Some(state) => state.info.clone(),
            None => return Err(FallbackReason::Negotiation("no output state".into())),
        };

        let buffer = host.allocate_output_buffer(&info).map_err(|e| {
            log::error!("Failed to allocate output buffer: {}", e);
            FallbackReason::Allocation(e.to_string())
        })?;

        if let Err(reason) = check_layout(&buffer, format, width, height, spec.alignment) {
            host.release_output_buffer(buffer);
            return Err(reason);
        }

        // fallback pictures are attributed when they are copied out
        if let Some(frame) = tracker.get_mut(system_frame_number) {
            frame.decode_only = false;
        }

        Ok(FrameRef {
            system_frame_number,
            buffer: Some(buffer),
            shared: Arc::clone(&self.shared),
        })
    }
}

fn check_layout(
    buffer: &OutputBuffer,
    format: VideoFormat,
    width: u32,
    height: u32,
    alignment: u32,
) -> std::result::Result<(), FallbackReason> {
    let info = buffer.info();
    if info.format != format || info.width < width || info.height < height {
        return Err(FallbackReason::Layout {
            plane: 0,
            detail: format!(
                "buffer is {} {}x{}, need {} {}x{}",
                info.format, info.width, info.height, format, width, height
            ),
        });
    }

    let alignment = alignment.max(1) as usize;
    let bytes_per_sample = format.bytes_per_sample();
    for plane in 0..format.n_planes() {
        let (plane_width, plane_height) = format.plane_dimensions(plane, width, height);
        let stride = info.stride(plane);
        let detail = if stride < plane_width as usize * bytes_per_sample {
            format!("pitch too small ({}/{}*{})", stride, plane_width, bytes_per_sample)
        } else if info.plane_height(plane) < plane_height {
            format!("lines too few ({}/{})", info.plane_height(plane), plane_height)
        } else if stride % alignment != 0 {
            format!("pitch not aligned ({}%{})", stride, alignment)
        } else if buffer.plane_address(plane) % alignment != 0 {
            "not aligned".to_string()
        } else {
            continue;
        };
        return Err(FallbackReason::Layout { plane, detail });
    }
    Ok(())
}

impl PlaneAllocator for DirectRenderAllocator {
    fn acquire_plane_buffer(
        &mut self,
        spec: &ImageSpec,
        picture: &mut DecodedPicture,
    ) -> Result<()> {
        match self.try_direct(spec, picture) {
            Ok(frame_ref) => {
                picture.set_storage(PlaneStorage::Direct(frame_ref));
                Ok(())
            }
            Err(reason) => {
                log::debug!("Direct rendering not possible: {}", reason);
                self.fallback.acquire_plane_buffer(spec, picture)
            }
        }
    }

    fn release_plane_buffer(&mut self, picture: DecodedPicture) {
        if picture.frame_ref().is_none() {
            self.fallback.release_plane_buffer(picture);
            return;
        }
        if let PlaneStorage::Direct(frame_ref) = picture.into_storage() {
            frame_ref.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h265::picture::FrameTag;
    use crate::error::DecodeError;

    /// Shares a [`PooledOutput`] with the test so pool counters stay observable.
    #[derive(Clone)]
    struct SharedPool(Arc<Mutex<PooledOutput>>);

    impl OutputHost for SharedPool {
        fn negotiate(&mut self, state: &OutputState) -> Result<()> {
            self.0.lock().negotiate(state)
        }

        fn allocate_output_buffer(&mut self, info: &VideoInfo) -> Result<OutputBuffer> {
            self.0.lock().allocate_output_buffer(info)
        }

        fn release_output_buffer(&mut self, buffer: OutputBuffer) {
            self.0.lock().release_output_buffer(buffer)
        }
    }

    fn setup(alignment: usize) -> (SharedState, SharedPool) {
        let pool = SharedPool(Arc::new(Mutex::new(PooledOutput::with_alignment(4, alignment))));
        let shared = new_shared(Box::new(pool.clone()));
        {
            let mut guard = shared.lock();
            guard.tracker.register(0, Some(0));
            guard.tracker.set_current(0);
        }
        (shared, pool)
    }

    fn picture(spec: &ImageSpec, bits: [u8; 3]) -> DecodedPicture {
        DecodedPicture::new(spec.clone(), bits, Some(0), FrameTag::FrameNumber(0))
    }

    #[test]
    fn test_direct_rendering_into_host_buffer() {
        let (shared, pool) = setup(16);
        let mut allocator = DirectRenderAllocator::new(Arc::clone(&shared));
        let spec = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16);
        let mut pic = picture(&spec, [8, 8, 8]);

        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();

        let frame_ref = pic.frame_ref().expect("direct storage");
        assert_eq!(frame_ref.system_frame_number(), 0);
        for plane in 0..3 {
            let (data, stride) = frame_ref.plane(plane).unwrap();
            assert_eq!(data.as_ptr() as usize % 16, 0);
            assert_eq!(stride % 16, 0);
        }
        assert!(!shared.lock().tracker.get(0).unwrap().decode_only);
        assert_eq!(
            pool.0.lock().state().unwrap().info.format,
            VideoFormat::I420
        );

        let (plane, stride) = pic.plane_mut(1).unwrap();
        assert_eq!(stride, 32);
        plane[0] = 0xAB;
        assert_eq!(pic.frame_ref().unwrap().plane(1).unwrap().0[0], 0xAB);

        // released without emission: the buffer goes back to the pool
        allocator.release_plane_buffer(pic);
        assert_eq!(pool.0.lock().pool().available(), 1);
    }

    #[test]
    fn test_taken_buffer_is_not_returned() {
        let (shared, pool) = setup(16);
        let mut allocator = DirectRenderAllocator::new(shared);
        let spec = ImageSpec::new(ChromaFormat::Yuv444, 32, 16, 16);
        let mut pic = picture(&spec, [8, 8, 8]);
        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();

        let buffer = pic.frame_ref_mut().unwrap().take_buffer().unwrap();
        assert_eq!(buffer.info().format, VideoFormat::Y444);
        allocator.release_plane_buffer(pic);
        assert_eq!(pool.0.lock().pool().available(), 0);
    }

    #[test]
    fn test_fallback_reasons() {
        let (shared, _pool) = setup(16);
        let mut allocator = DirectRenderAllocator::new(shared);

        let cropped = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16).with_visible_size(60, 30);
        let pic = picture(&cropped, [8, 8, 8]);
        assert!(matches!(
            allocator.try_direct(&cropped, &pic),
            Err(FallbackReason::Cropped { .. })
        ));

        let unaligned = ImageSpec::new(ChromaFormat::Yuv420, 60, 32, 16);
        let pic = picture(&unaligned, [8, 8, 8]);
        assert!(matches!(
            allocator.try_direct(&unaligned, &pic),
            Err(FallbackReason::Cropped { .. })
        ));

        let spec = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16);
        let pic = picture(&spec, [8, 10, 10]);
        assert_eq!(
            allocator.try_direct(&spec, &pic).err(),
            Some(FallbackReason::MixedBitDepth([8, 10, 10]))
        );

        let pic = picture(&spec, [12, 12, 12]);
        assert!(matches!(
            allocator.try_direct(&spec, &pic),
            Err(FallbackReason::BitDepthMismatch { .. })
        ));

        let mono = ImageSpec::new(ChromaFormat::Mono, 64, 32, 16);
        let pic = picture(&mono, [10, 0, 0]);
        assert!(matches!(
            allocator.try_direct(&mono, &pic),
            Err(FallbackReason::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_fallback_allocates_internally() {
        let (shared, pool) = setup(4);
        let mut allocator = DirectRenderAllocator::new(Arc::clone(&shared));
        // a 24 byte chroma stride is not a multiple of 16
        let spec = ImageSpec::new(ChromaFormat::Yuv420, 40, 16, 16).with_visible_size(48, 16);
        let mut pic = picture(&spec, [8, 8, 8]);
        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();
        assert!(pic.is_allocated());
        assert!(pic.frame_ref().is_none());
        assert_eq!(pool.0.lock().pool().available(), 1);
        // the frame is only attributed once the picture is copied out
        assert!(shared.lock().tracker.get(0).unwrap().decode_only);
        allocator.release_plane_buffer(pic);
    }

    #[test]
    fn test_dropped_picture_returns_buffer() {
        let (shared, pool) = setup(16);
        let mut allocator = DirectRenderAllocator::new(Arc::clone(&shared));
        let spec = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16);
        let mut pic = picture(&spec, [8, 8, 8]);
        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();
        assert!(pic.frame_ref().is_some());
        assert_eq!(pool.0.lock().pool().available(), 0);

        drop(pic);
        assert_eq!(pool.0.lock().pool().available(), 1);
    }

    #[test]
    fn test_no_current_frame() {
        let shared = new_shared(Box::new(PooledOutput::new()));
        let mut allocator = DirectRenderAllocator::new(shared);
        let spec = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16);
        let mut pic = picture(&spec, [8, 8, 8]);
        assert_eq!(
            allocator.try_direct(&spec, &pic).err(),
            Some(FallbackReason::NoCurrentFrame)
        );
        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();
        assert!(pic.frame_ref().is_none());
    }

    struct RefusingHost;

    impl OutputHost for RefusingHost {
        fn negotiate(&mut self, _state: &OutputState) -> Result<()> {
            Err(DecodeError::Negotiation("not linked".into()))
        }

        fn allocate_output_buffer(&mut self, _info: &VideoInfo) -> Result<OutputBuffer> {
            Err(DecodeError::Allocation("no pool".into()))
        }
    }

    #[test]
    fn test_negotiation_failure_falls_back() {
        let shared = new_shared(Box::new(RefusingHost));
        {
            let mut guard = shared.lock();
            guard.tracker.register(3, None);
            guard.tracker.set_current(3);
        }
        let mut allocator = DirectRenderAllocator::new(shared);
        let spec = ImageSpec::new(ChromaFormat::Yuv420, 64, 32, 16);
        let mut pic = picture(&spec, [8, 8, 8]);
        assert!(matches!(
            allocator.try_direct(&spec, &pic),
            Err(FallbackReason::Negotiation(_))
        ));
        allocator.acquire_plane_buffer(&spec, &mut pic).unwrap();
        assert!(pic.is_allocated());
    }
}
