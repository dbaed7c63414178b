//! # H.265/HEVC decoding front end
//!
//! This module turns coded HEVC access units into raw pictures by feeding a
//! pluggable [`DecoderEngine`]. It takes care of everything around the actual
//! decoding:
//!
//! - hvcC / Annex-B codec configuration parsing and decoder priming
//! - splitting length-prefixed access units into NAL units
//! - driving the engine and classifying its status codes
//! - direct rendering into host-owned buffers, with a copy fallback
//! - mapping bit depth and chroma format to an output pixel format
//! - attributing pictures to submitted frames
//!
//! ## Example Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use h265dec::codec::h265::{ExtraData, FramingMode, LengthPrefixedNals};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let codec_data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x0C]);
//! let extra = ExtraData::parse(&codec_data)?;
//! assert_eq!(extra.framing(), FramingMode::Raw);
//!
//! let unit = [0x00, 0x00, 0x00, 0x02, 0x26, 0x01];
//! for nal in LengthPrefixedNals::new(&unit, 4) {
//!     println!("NAL of {} bytes", nal?.len());
//! }
//! # Ok(())
//! # }
//! ```

/// Direct rendering into host buffers
pub mod bridge;

/// Host-facing decoder and decode driver
pub mod decoder;

/// Decoder engine contract
pub mod engine;

/// hvcC and Annex-B codec configuration
pub mod extradata;

/// Output format mapping and plane repacking
pub mod format;

/// Length-prefixed NAL unit splitting
pub mod framer;

/// Submitted frame bookkeeping
pub mod frames;

/// Decoded pictures and plane allocation
pub mod picture;

/// NAL unit type definitions
pub mod types;


pub use bridge::{DirectRenderAllocator, FallbackReason, FrameRef, OutputHost, PooledOutput};
pub use decoder::{H265Decoder, InputCaps, StreamFormat};
pub use engine::{
    DecodeStep, DecoderEngine, EngineFactory, EngineMessage, EngineStatus, MAX_THREAD_COUNT,
};
pub use extradata::{ExtraData, FramingMode, HvcConfig, HvcConfigHeader, ParameterSetArray};
pub use format::{video_format_for, OutputState};
pub use framer::LengthPrefixedNals;
pub use frames::{CodecFrame, FrameTracker};
pub use picture::{
    ChromaFormat, DecodedPicture, DefaultAllocator, FrameTag, ImageSpec, PlaneAllocator,
};
pub use types::NALUnitType;
