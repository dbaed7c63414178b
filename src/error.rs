use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

use crate::av::Fraction;
use crate::codec::h265::{ChromaFormat, EngineMessage};

#[derive(Error, Debug)]
pub enum DecodeError {
    /// Malformed extradata or NAL framing. Fatal for the current buffer only.
    #[error("format error: {0}")]
    Format(String),

    /// The engine returned a status the driver does not handle.
    #[error("{context}: {message} (code={code})")]
    Engine {
        context: &'static str,
        message: String,
        code: i32,
    },

    #[error("unsupported image format {chroma:?} with {bits_per_pixel} bits per pixel")]
    UnsupportedFormat {
        chroma: ChromaFormat,
        bits_per_pixel: u8,
    },

    #[error("negotiation error: {0}")]
    Negotiation(String),

    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("decoder has not been started")]
    NotStarted,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl DecodeError {
    pub(crate) fn engine(context: &'static str, message: &EngineMessage) -> Self {
        DecodeError::Engine {
            context,
            message: message.text.clone(),
            code: message.code,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Non-fatal conditions surfaced to the host while decoding continues.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A warning drained from the engine after a decode batch.
    EngineWarning(EngineMessage),
    /// The hvcC record carried a version byte other than 0.
    UnsupportedExtraDataVersion(u8),
    /// Upstream framerate was missing or implausible and 24/1 was used.
    FramerateDefaulted { upstream: Option<Fraction> },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EngineWarning(msg) => write!(f, "{} (code={})", msg.text, msg.code),
            Notice::UnsupportedExtraDataVersion(version) => write!(
                f,
                "Unsupported extra data version {}, decoding may fail",
                version
            ),
            Notice::FramerateDefaulted { upstream: Some(rate) } => {
                write!(f, "Framerate is too high ({}), defaulting to 24/1", rate)
            }
            Notice::FramerateDefaulted { upstream: None } => {
                write!(f, "Framerate is unknown, defaulting to 24/1")
            }
        }
    }
}
