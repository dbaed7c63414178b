use crate::av::round_up;
use crate::error::{DecodeError, Result};

use super::bridge::FrameRef;

/// Chroma sampling of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaFormat {
    Mono,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    pub fn n_planes(&self) -> usize {
        match self {
            ChromaFormat::Mono => 1,
            _ => 3,
        }
    }

    /// Width and height in samples of `plane` for a picture of the given size.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 {
            return (width, height);
        }
        match self {
            ChromaFormat::Yuv420 => ((width + 1) / 2, (height + 1) / 2),
            ChromaFormat::Yuv422 => ((width + 1) / 2, height),
            ChromaFormat::Yuv444 => (width, height),
            ChromaFormat::Mono => (0, 0),
        }
    }
}

/// Association between an engine picture and the access unit it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameTag {
    #[default]
    None,
    FrameNumber(u32),
}

/// Geometry of a picture the engine is about to decode, passed to the
/// allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub chroma: ChromaFormat,
    /// Coded luma width before alignment.
    pub width: u32,
    /// Coded luma height.
    pub height: u32,
    /// Required alignment in bytes of plane strides and plane start addresses.
    pub alignment: u32,
    pub visible_width: u32,
    pub visible_height: u32,
}

impl ImageSpec {
    pub fn new(chroma: ChromaFormat, width: u32, height: u32, alignment: u32) -> Self {
        Self {
            chroma,
            width,
            height,
            alignment,
            visible_width: width,
            visible_height: height,
        }
    }

    pub fn with_visible_size(mut self, width: u32, height: u32) -> Self {
        self.visible_width = width;
        self.visible_height = height;
        self
    }

    /// Coded width rounded up to the alignment.
    pub fn aligned_width(&self) -> u32 {
        round_up(self.width as usize, self.alignment.max(1) as usize) as u32
    }
}

/// Where a picture's samples live.
pub enum PlaneStorage {
    /// The allocator has not been asked yet.
    Unallocated,
    /// Memory handed out by the engine's own allocator.
    Internal(InternalPlanes),
    /// Memory of a caller-owned output buffer.
    Direct(FrameRef),
}

/// Planes owned by the engine's default allocator.
pub struct InternalPlanes {
    planes: Vec<Vec<u8>>,
    strides: Vec<usize>,
}

/// A picture produced by the decoder engine.
///
/// Pictures are created by the engine, filled through [`DecodedPicture::plane_mut`]
/// once a [`PlaneAllocator`] supplied storage, and finally handed back to the
/// allocator through [`PlaneAllocator::release_plane_buffer`], which consumes
/// them.
pub struct DecodedPicture {
    spec: ImageSpec,
    bits: [u8; 3],
    pts: Option<i64>,
    tag: FrameTag,
    storage: PlaneStorage,
}

impl DecodedPicture {
    pub fn new(spec: ImageSpec, bits: [u8; 3], pts: Option<i64>, tag: FrameTag) -> Self {
        Self {
            spec,
            bits,
            pts,
            tag,
            storage: PlaneStorage::Unallocated,
        }
    }

    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        self.spec.chroma
    }

    pub fn n_planes(&self) -> usize {
        self.spec.chroma.n_planes()
    }

    /// Visible width of `plane` in samples.
    pub fn width(&self, plane: usize) -> u32 {
        self.spec
            .chroma
            .plane_dimensions(plane, self.spec.visible_width, self.spec.visible_height)
            .0
    }

    /// Visible height of `plane` in rows.
    pub fn height(&self, plane: usize) -> u32 {
        self.spec
            .chroma
            .plane_dimensions(plane, self.spec.visible_width, self.spec.visible_height)
            .1
    }

    pub fn bits_per_pixel(&self, plane: usize) -> u8 {
        if plane < self.n_planes() {
            self.bits[plane]
        } else {
            0
        }
    }

    /// Largest bit depth across all planes.
    pub fn max_bits_per_pixel(&self) -> u8 {
        (0..self.n_planes())
            .map(|plane| self.bits[plane])
            .max()
            .unwrap_or(0)
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn tag(&self) -> FrameTag {
        self.tag
    }

    /// Samples of `plane` with their row stride in bytes.
    pub fn plane(&self, plane: usize) -> Option<(&[u8], usize)> {
        if plane >= self.n_planes() {
            return None;
        }
        match &self.storage {
            PlaneStorage::Unallocated => None,
            PlaneStorage::Internal(internal) => {
                Some((internal.planes[plane].as_slice(), internal.strides[plane]))
            }
            PlaneStorage::Direct(frame_ref) => frame_ref.plane(plane),
        }
    }

    /// Writable samples of `plane` with their row stride in bytes.
    pub fn plane_mut(&mut self, plane: usize) -> Option<(&mut [u8], usize)> {
        if plane >= self.n_planes() {
            return None;
        }
        match &mut self.storage {
            PlaneStorage::Unallocated => None,
            PlaneStorage::Internal(internal) => Some((
                internal.planes[plane].as_mut_slice(),
                internal.strides[plane],
            )),
            PlaneStorage::Direct(frame_ref) => frame_ref.plane_mut(plane),
        }
    }

    pub fn is_allocated(&self) -> bool {
        !matches!(self.storage, PlaneStorage::Unallocated)
    }

    /// The frame reference attached by direct rendering, if any.
    pub fn frame_ref(&self) -> Option<&FrameRef> {
        match &self.storage {
            PlaneStorage::Direct(frame_ref) => Some(frame_ref),
            _ => None,
        }
    }

    pub fn frame_ref_mut(&mut self) -> Option<&mut FrameRef> {
        match &mut self.storage {
            PlaneStorage::Direct(frame_ref) => Some(frame_ref),
            _ => None,
        }
    }

    pub(crate) fn set_storage(&mut self, storage: PlaneStorage) {
        self.storage = storage;
    }

    pub(crate) fn into_storage(self) -> PlaneStorage {
        self.storage
    }
}

impl std::fmt::Debug for DecodedPicture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = match &self.storage {
            PlaneStorage::Unallocated => "unallocated",
            PlaneStorage::Internal(_) => "internal",
            PlaneStorage::Direct(_) => "direct",
        };
        f.debug_struct("DecodedPicture")
            .field("spec", &self.spec)
            .field("bits", &self.bits)
            .field("pts", &self.pts)
            .field("tag", &self.tag)
            .field("storage", &storage)
            .finish()
    }
}

/// Supplies and reclaims the memory the engine decodes pictures into.
///
/// The engine calls `acquire_plane_buffer` once per picture, before writing any
/// sample, and `release_plane_buffer` once it no longer needs the picture.
pub trait PlaneAllocator: Send {
    fn acquire_plane_buffer(
        &mut self,
        spec: &ImageSpec,
        picture: &mut DecodedPicture,
    ) -> Result<()>;
    fn release_plane_buffer(&mut self, picture: DecodedPicture);
}

/// The engine's built-in allocator: one heap vector per plane, strides
/// rounded up to the requested alignment.
#[derive(Debug, Default)]
pub struct DefaultAllocator;

impl PlaneAllocator for DefaultAllocator {
    fn acquire_plane_buffer(
        &mut self,
        spec: &ImageSpec,
        picture: &mut DecodedPicture,
    ) -> Result<()> {
        if spec.alignment == 0 || !spec.alignment.is_power_of_two() {
            return Err(DecodeError::Allocation(format!(
                "invalid plane alignment {}",
                spec.alignment
            )));
        }

        let alignment = spec.alignment as usize;
        let coded_width = spec.aligned_width();
        let n_planes = spec.chroma.n_planes();
        let mut planes = Vec::with_capacity(n_planes);
        let mut strides = Vec::with_capacity(n_planes);

        for plane in 0..n_planes {
            let (width, height) = spec.chroma.plane_dimensions(plane, coded_width, spec.height);
            let bytes_per_sample = (picture.bits_per_pixel(plane) as usize + 7) / 8;
            let stride = round_up(width as usize * bytes_per_sample.max(1), alignment);
            planes.push(vec![0u8; stride * height as usize]);
            strides.push(stride);
        }

        picture.set_storage(PlaneStorage::Internal(InternalPlanes { planes, strides }));
        Ok(())
    }

    fn release_plane_buffer(&mut self, picture: DecodedPicture) {
        drop(picture);
    }
}
