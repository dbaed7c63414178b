//! Output format selection, geometry negotiation and plane repacking.

use crate::av::{Fraction, VideoFormat, VideoInfo};
use crate::error::{DecodeError, Notice, Result};

use super::bridge::OutputHost;
use super::picture::ChromaFormat;

/// Framerate announced when neither the settings nor upstream supply a usable one.
pub const DEFAULT_FRAMERATE: Fraction = Fraction::new(24, 1);
/// Upstream framerates above this are treated as bogus.
pub const MAX_UPSTREAM_FPS: f64 = 1000.0;

/// Output pixel format for a chroma format and bit depth.
pub fn video_format_for(chroma: ChromaFormat, bits_per_pixel: u8) -> VideoFormat {
    match (chroma, bits_per_pixel) {
        (ChromaFormat::Mono, 8) => VideoFormat::Gray8,
        (ChromaFormat::Yuv420, 8) => VideoFormat::I420,
        (ChromaFormat::Yuv420, 9..=16) => VideoFormat::I420_10LE,
        (ChromaFormat::Yuv422, 8) => VideoFormat::Y42B,
        (ChromaFormat::Yuv422, 9..=16) => VideoFormat::I422_10LE,
        (ChromaFormat::Yuv444, 8) => VideoFormat::Y444,
        (ChromaFormat::Yuv444, 9..=16) => VideoFormat::Y444_10LE,
        _ => {
            log::debug!(
                "Unsupported output colorspace {:?} with {} bits per pixel",
                chroma,
                bits_per_pixel
            );
            VideoFormat::Unknown
        }
    }
}

/// The output stream description last announced to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputState {
    pub info: VideoInfo,
    pub framerate: Fraction,
}

/// Tracks the negotiated output geometry and re-announces it on change.
#[derive(Debug, Default)]
pub struct OutputNegotiator {
    geometry: Option<(VideoFormat, u32, u32)>,
    configured_framerate: Option<Fraction>,
    upstream_framerate: Option<Fraction>,
    state: Option<OutputState>,
}

impl OutputNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_configured_framerate(&mut self, framerate: Option<Fraction>) {
        self.configured_framerate = framerate.filter(|fps| fps.num > 0);
    }

    pub fn set_upstream_framerate(&mut self, framerate: Option<Fraction>) {
        self.upstream_framerate = framerate;
    }

    pub fn state(&self) -> Option<&OutputState> {
        self.state.as_ref()
    }

    /// Announces a new output description to `host` if the picture geometry
    /// differs from the last one negotiated.
    ///
    /// Returns a notice when the framerate had to be defaulted. On failure the
    /// previous geometry is kept so the next picture retries.
    pub fn image_available(
        &mut self,
        host: &mut dyn OutputHost,
        format: VideoFormat,
        width: u32,
        height: u32,
    ) -> Result<Option<Notice>> {
        if self.geometry == Some((format, width, height)) {
            return Ok(None);
        }

        let (framerate, notice) = self.resolve_framerate();
        let state = OutputState {
            info: VideoInfo::new(format, width, height),
            framerate,
        };
        host.negotiate(&state)?;

        log::debug!("Frame dimensions are {} x {} ({})", width, height, format);
        self.geometry = Some((format, width, height));
        self.state = Some(state);
        Ok(notice)
    }

    pub fn reset(&mut self) {
        self.geometry = None;
        self.upstream_framerate = None;
        self.state = None;
    }

    fn resolve_framerate(&self) -> (Fraction, Option<Notice>) {
        if let Some(framerate) = self.configured_framerate {
            return (framerate, None);
        }
        match self.upstream_framerate {
            Some(framerate) if framerate.as_f64().map_or(false, |fps| fps <= MAX_UPSTREAM_FPS) => {
                (framerate, None)
            }
            upstream => {
                match upstream {
                    Some(fps) => log::warn!("Framerate is too high ({}), defaulting to 24/1", fps),
                    None => log::warn!("No upstream framerate, defaulting to 24/1"),
                }
                (
                    DEFAULT_FRAMERATE,
                    Some(Notice::FramerateDefaulted { upstream }),
                )
            }
        }
    }
}

/// One plane of samples: bytes, row stride and significant bits per sample.
///
/// Samples wider than 8 bits are stored as 16-bit little-endian words.
pub struct SamplePlane<T> {
    pub data: T,
    pub stride: usize,
    pub bits: u8,
}

impl<T> SamplePlane<T> {
    pub fn new(data: T, stride: usize, bits: u8) -> Self {
        Self { data, stride, bits }
    }

    fn bytes_per_sample(&self) -> usize {
        if self.bits > 8 {
            2
        } else {
            1
        }
    }
}

fn required_len(stride: usize, row_bytes: usize, height: usize) -> usize {
    if height == 0 {
        0
    } else {
        stride * (height - 1) + row_bytes
    }
}

/// Copies `width` x `height` samples from `src` to `dst`, shifting each
/// sample to the destination bit depth.
pub fn repack_plane(
    src: SamplePlane<&[u8]>,
    dst: SamplePlane<&mut [u8]>,
    width: usize,
    height: usize,
) -> Result<()> {
    let src_row = width * src.bytes_per_sample();
    let dst_row = width * dst.bytes_per_sample();

    if src.data.len() < required_len(src.stride, src_row, height)
        || dst.data.len() < required_len(dst.stride, dst_row, height)
        || src.stride < src_row
        || dst.stride < dst_row
    {
        return Err(DecodeError::Allocation(format!(
            "plane of {}x{} does not fit (src {} bytes, dst {} bytes)",
            width,
            height,
            src.data.len(),
            dst.data.len()
        )));
    }

    let src_bits = src.bits;
    let dst_bits = dst.bits;

    if src_bits == dst_bits {
        if src.stride == src_row && dst.stride == dst_row {
            let len = src_row * height;
            dst.data[..len].copy_from_slice(&src.data[..len]);
        } else {
            for row in 0..height {
                let s = &src.data[row * src.stride..row * src.stride + src_row];
                dst.data[row * dst.stride..row * dst.stride + dst_row].copy_from_slice(s);
            }
        }
        return Ok(());
    }

    let rows = (0..height).map(|row| (row * src.stride, row * dst.stride));

    if src_bits > dst_bits && dst_bits > 8 {
        let shift = src_bits - dst_bits;
        for (s, d) in rows {
            let s = &src.data[s..s + src_row];
            let d = &mut dst.data[d..d + dst_row];
            for (s, d) in s.chunks_exact(2).zip(d.chunks_exact_mut(2)) {
                let sample = u16::from_le_bytes([s[0], s[1]]) >> shift;
                d.copy_from_slice(&sample.to_le_bytes());
            }
        }
    } else if src_bits > dst_bits && dst_bits == 8 {
        let shift = src_bits - dst_bits;
        for (s, d) in rows {
            let s = &src.data[s..s + src_row];
            let d = &mut dst.data[d..d + dst_row];
            for (s, d) in s.chunks_exact(2).zip(d.iter_mut()) {
                *d = (u16::from_le_bytes([s[0], s[1]]) >> shift) as u8;
            }
        }
    } else if src_bits < dst_bits && src_bits > 8 {
        let shift = dst_bits - src_bits;
        for (s, d) in rows {
            let s = &src.data[s..s + src_row];
            let d = &mut dst.data[d..d + dst_row];
            for (s, d) in s.chunks_exact(2).zip(d.chunks_exact_mut(2)) {
                let sample = u16::from_le_bytes([s[0], s[1]]) << shift;
                d.copy_from_slice(&sample.to_le_bytes());
            }
        }
    } else if src_bits < dst_bits && src_bits == 8 {
        let shift = dst_bits - src_bits;
        for (s, d) in rows {
            let s = &src.data[s..s + src_row];
            let d = &mut dst.data[d..d + dst_row];
            for (s, d) in s.iter().zip(d.chunks_exact_mut(2)) {
                let sample = (*s as u16) << shift;
                d.copy_from_slice(&sample.to_le_bytes());
            }
        }
    } else {
        return Err(DecodeError::Format(format!(
            "cannot repack {} bit samples to {} bits",
            src_bits, dst_bits
        )));
    }

    Ok(())
}
