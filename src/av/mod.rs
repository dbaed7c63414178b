use async_trait::async_trait;

/// Video decoder driven from an async pipeline.
///
/// Decoding itself is synchronous and runs on the calling task; the trait only
/// lets decoders slot into async packet loops next to demuxers and sinks.
#[async_trait]
pub trait VideoDecoder: Send {
    /// Feeds one access unit and returns a picture if one became ready.
    async fn decode(&mut self, packet: Packet) -> crate::Result<Option<VideoFrame>>;
    /// Drops every queued picture and returns to a clean decoding state.
    async fn flush(&mut self) -> crate::Result<()>;
    fn close(&mut self);
}

mod buffer;
mod frame;
mod packet;
mod video;

pub use buffer::*;
pub use frame::*;
pub use packet::*;
pub use video::*;
