#![cfg_attr(docsrs, feature(doc_cfg))]

//! # h265dec - HEVC decoding front end
//!
//! `h265dec` sits between a demuxer and an HEVC decoding engine. It takes
//! coded access units, frames them the way the engine expects, and turns the
//! engine's pictures into frames in caller-owned output buffers.
//!
//! ## Features
//!
//! - hvcC (ISO/IEC 14496-15) and Annex-B codec configuration parsing
//! - Length-prefixed NAL unit splitting with overflow detection
//! - Zero-copy decoding into output buffers, with a copying fallback for
//!   cropped or mixed bit depth pictures
//! - Output format negotiation for 8 and 10 bit 4:2:0, 4:2:2 and 4:4:4
//! - Frame attribution across reordering delays, flush and end of stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use h265dec::av::Packet;
//! use h265dec::codec::h265::{EngineFactory, H265Decoder, InputCaps, PooledOutput};
//! use h265dec::config::DecoderSettings;
//!
//! # fn engine_factory() -> EngineFactory { unimplemented!() }
//! # fn main() -> h265dec::Result<()> {
//! let settings = DecoderSettings::load()?;
//! let mut decoder = H265Decoder::new(engine_factory(), PooledOutput::new(), settings);
//! decoder.start()?;
//! decoder.configure(InputCaps::new().with_codec_data(vec![0x00, 0x00, 0x00, 0x01, 0x40, 0x01]))?;
//!
//! let packet = Packet::new(vec![0x00, 0x00, 0x00, 0x01, 0x26, 0x01, 0xAF]).with_pts(0);
//! if let Some(frame) = decoder.submit(packet)? {
//!     println!("{}x{} frame {}", frame.width(), frame.height(), frame.system_frame_number);
//! }
//! decoder.submit(Packet::end_of_stream(1))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: packets, output buffers, pixel formats and the async decoder trait
//! - `codec`: the HEVC front end and the engine contract
//! - `config`: decoder settings from files and the environment
//! - `error`: error and notice types
//! - `utils`: bitstream reading

/// Audio/Video base types and utilities
pub mod av;

/// Codec implementations
pub mod codec;

/// Decoder settings
pub mod config;

/// Error types and utilities
pub mod error;

/// Common utilities and helper functions
pub mod utils;

pub use error::{DecodeError, Notice, Result};
