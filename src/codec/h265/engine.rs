use std::fmt;

use super::picture::{DecodedPicture, FrameTag, PlaneAllocator};

/// Upper bound on worker threads an engine accepts.
pub const MAX_THREAD_COUNT: usize = 32;

/// Message attached to an engine warning or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    pub code: i32,
    pub text: String,
}

impl EngineMessage {
    pub fn new(code: i32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code={})", self.text, self.code)
    }
}

/// Outcome of an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    /// The engine consumed everything it was given.
    WaitingForInputData,
    /// The output picture queue is full and must be drained first.
    ImageBufferFull,
    Failed(EngineMessage),
}

impl EngineStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, EngineStatus::Ok)
    }
}

/// Result of one [`DecoderEngine::decode_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeStep {
    pub status: EngineStatus,
    /// More work is pending and another step would make progress.
    pub more: bool,
}

/// The HEVC decoding engine the pipeline feeds.
///
/// Implementations own the actual decoding state. The engine obtains picture
/// memory exclusively through the installed [`PlaneAllocator`] and must hand
/// every picture it drops (on `reset`, on `release_picture`, on drop) back to
/// that allocator.
pub trait DecoderEngine: Send {
    fn version(&self) -> &str;

    fn set_image_allocator(&mut self, allocator: Box<dyn PlaneAllocator>);

    fn start_worker_threads(&mut self, threads: usize) -> EngineStatus;

    /// Enables or disables verification of SEI decoded-picture hashes.
    fn set_check_hash(&mut self, _enabled: bool) {}

    /// Pushes Annex-B data; the engine scans for start codes itself.
    fn push_data(&mut self, data: &[u8], pts: Option<i64>, tag: FrameTag) -> EngineStatus;

    /// Pushes a single NAL unit without start code or length prefix.
    fn push_nal(&mut self, nal: &[u8], pts: Option<i64>, tag: FrameTag) -> EngineStatus;

    /// Marks the end of the current Annex-B unit.
    fn push_end_of_unit(&mut self);

    /// Signals end of stream so that reordering delays are flushed out.
    fn flush_data(&mut self) -> EngineStatus;

    fn decode_step(&mut self) -> DecodeStep;

    fn next_warning(&mut self) -> Option<EngineMessage>;

    fn peek_next_picture(&self) -> Option<&DecodedPicture>;

    fn pop_next_picture(&mut self) -> Option<DecodedPicture>;

    /// Gives a popped picture back so its memory can be released.
    fn release_picture(&mut self, picture: DecodedPicture);

    /// Drops all decoding state, including queued input and pictures.
    fn reset(&mut self);
}

/// Creates a fresh engine instance for every decoder start.
pub type EngineFactory = Box<dyn Fn() -> crate::Result<Box<dyn DecoderEngine>> + Send + Sync>;

/// Number of worker threads to request for a `max_threads` setting.
///
/// Zero means automatic: twice the number of CPU cores, since some workers
/// block while waiting on dependent pictures. The result never exceeds
/// [`MAX_THREAD_COUNT`].
pub fn resolve_worker_threads(max_threads: u32) -> usize {
    let threads = if max_threads == 0 {
        // num_cpus reports at least one core even when detection fails
        num_cpus::get() * 2
    } else {
        max_threads as usize
    };
    threads.min(MAX_THREAD_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_thread_count() {
        assert_eq!(resolve_worker_threads(1), 1);
        assert_eq!(resolve_worker_threads(7), 7);
        assert_eq!(resolve_worker_threads(500), MAX_THREAD_COUNT);
    }

    #[test]
    fn test_auto_thread_count() {
        let threads = resolve_worker_threads(0);
        assert!(threads >= 2);
        assert!(threads <= MAX_THREAD_COUNT);
        assert_eq!(threads % 2, 0);
    }
}
