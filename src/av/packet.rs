use bytes::Bytes;

/// A coded access unit as handed over by the demuxer.
///
/// `frame_number` is assigned by the caller and must increase monotonically in
/// decode order; the decoder uses it to match decoded pictures back to the
/// access unit that produced them. An empty `data` payload marks end of stream
/// and asks the engine to drain what it still holds.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub frame_number: u32,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            frame_number: 0,
        }
    }

    /// An empty packet, used to signal end of stream.
    pub fn end_of_stream(frame_number: u32) -> Self {
        Self::new(Bytes::new()).with_frame_number(frame_number)
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_frame_number(mut self, frame_number: u32) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.data.is_empty()
    }
}
