use super::buffer::OutputBuffer;
use super::video::VideoInfo;

/// A decoded picture ready for presentation.
#[derive(Debug)]
pub struct VideoFrame {
    /// Frame number of the access unit this picture is attributed to.
    pub system_frame_number: u32,
    /// Presentation timestamp reported by the engine for the picture.
    pub pts: Option<i64>,
    pub buffer: OutputBuffer,
    /// Whether the engine decoded straight into `buffer`.
    pub direct: bool,
}

impl VideoFrame {
    pub fn info(&self) -> &VideoInfo {
        self.buffer.info()
    }

    pub fn width(&self) -> u32 {
        self.buffer.info().width
    }

    pub fn height(&self) -> u32 {
        self.buffer.info().height
    }
}
