use std::fmt;

/// A rational number, used for frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub num: i32,
    pub den: i32,
}

impl Fraction {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as floating point, `None` when the denominator is zero.
    pub fn as_f64(&self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(self.num as f64 / self.den as f64)
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl std::str::FromStr for Fraction {
    type Err = crate::error::DecodeError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((num, den)) => Ok(Fraction::new(num.trim().parse()?, den.trim().parse()?)),
            None => Ok(Fraction::new(s.parse()?, 1)),
        }
    }
}

/// Raw output pixel formats the decoder can produce.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Unknown,
    /// 8-bit luma only.
    Gray8,
    /// Planar 4:2:0, 8 bits per component.
    I420,
    /// Planar 4:2:0, 10 bits per component in 16-bit little-endian words.
    I420_10LE,
    /// Planar 4:2:2, 8 bits per component.
    Y42B,
    /// Planar 4:2:2, 10 bits per component in 16-bit little-endian words.
    I422_10LE,
    /// Planar 4:4:4, 8 bits per component.
    Y444,
    /// Planar 4:4:4, 10 bits per component in 16-bit little-endian words.
    Y444_10LE,
}

impl VideoFormat {
    pub fn n_planes(&self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Gray8 => 1,
            _ => 3,
        }
    }

    /// Significant bits per component.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Gray8 | Self::I420 | Self::Y42B | Self::Y444 => 8,
            Self::I420_10LE | Self::I422_10LE | Self::Y444_10LE => 10,
        }
    }

    /// Storage size of one component sample.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits() as usize + 7) / 8
    }

    /// Horizontal and vertical chroma subsampling as log2 factors.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            Self::I420 | Self::I420_10LE => (1, 1),
            Self::Y42B | Self::I422_10LE => (1, 0),
            _ => (0, 0),
        }
    }

    /// Width and height in samples of `plane` for a picture of the given size.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 {
            return (width, height);
        }
        let (wsub, hsub) = self.chroma_shift();
        (
            (width + (1 << wsub) - 1) >> wsub,
            (height + (1 << hsub) - 1) >> hsub,
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Gray8 => "GRAY8",
            Self::I420 => "I420",
            Self::I420_10LE => "I420_10LE",
            Self::Y42B => "Y42B",
            Self::I422_10LE => "I422_10LE",
            Self::Y444 => "Y444",
            Self::Y444_10LE => "Y444_10LE",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stride alignment used when no explicit alignment is requested.
pub const DEFAULT_STRIDE_ALIGN: usize = 4;

/// Memory layout of a raw picture: format, size and per-plane placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    strides: [usize; 3],
    offsets: [usize; 3],
    size: usize,
}

impl VideoInfo {
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self::with_alignment(format, width, height, DEFAULT_STRIDE_ALIGN)
    }

    /// Lays out planes back to back with every stride and plane offset rounded
    /// up to `align` bytes.
    pub fn with_alignment(format: VideoFormat, width: u32, height: u32, align: usize) -> Self {
        let align = align.max(1);
        let mut strides = [0usize; 3];
        let mut offsets = [0usize; 3];
        let mut size = 0usize;

        for plane in 0..format.n_planes() {
            let (plane_width, plane_height) = format.plane_dimensions(plane, width, height);
            let stride = round_up(plane_width as usize * format.bytes_per_sample(), align);
            offsets[plane] = round_up(size, align);
            strides[plane] = stride;
            size = offsets[plane] + stride * plane_height as usize;
        }

        Self {
            format,
            width,
            height,
            strides,
            offsets,
            size,
        }
    }

    pub fn n_planes(&self) -> usize {
        self.format.n_planes()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides[plane]
    }

    pub fn offset(&self, plane: usize) -> usize {
        self.offsets[plane]
    }

    /// Number of rows in `plane`.
    pub fn plane_height(&self, plane: usize) -> u32 {
        self.format.plane_dimensions(plane, self.width, self.height).1
    }

    /// Number of samples per row in `plane`.
    pub fn plane_width(&self, plane: usize) -> u32 {
        self.format.plane_dimensions(plane, self.width, self.height).0
    }

    /// Total number of bytes needed to hold all planes.
    pub fn size(&self) -> usize {
        self.size
    }
}

pub(crate) fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}
