use std::collections::BTreeMap;

/// Bookkeeping for one submitted access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecFrame {
    pub system_frame_number: u32,
    pub pts: Option<i64>,
    /// Still set when no picture has been attributed to the frame yet.
    pub decode_only: bool,
}

/// In-flight access units, keyed by their caller-supplied frame number.
///
/// The tracker also remembers which frame is being decoded right now so the
/// allocation bridge can attribute a freshly allocated picture to it.
#[derive(Debug, Default)]
pub struct FrameTracker {
    current: Option<u32>,
    pending: BTreeMap<u32, CodecFrame>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly submitted frame, flagged decode-only.
    pub fn register(&mut self, system_frame_number: u32, pts: Option<i64>) {
        self.pending.insert(
            system_frame_number,
            CodecFrame {
                system_frame_number,
                pts,
                decode_only: true,
            },
        );
    }

    pub fn set_current(&mut self, system_frame_number: u32) {
        self.current = Some(system_frame_number);
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn get(&self, system_frame_number: u32) -> Option<&CodecFrame> {
        self.pending.get(&system_frame_number)
    }

    pub fn get_mut(&mut self, system_frame_number: u32) -> Option<&mut CodecFrame> {
        self.pending.get_mut(&system_frame_number)
    }

    /// Removes a frame whose picture is being emitted.
    ///
    /// Older frames that are still decode-only never produced a picture and
    /// are dropped along with it.
    pub fn finish(&mut self, system_frame_number: u32) -> Option<CodecFrame> {
        let finished = self.pending.remove(&system_frame_number);
        let stale: Vec<u32> = self
            .pending
            .range(..system_frame_number)
            .filter(|(_, frame)| frame.decode_only)
            .map(|(number, _)| *number)
            .collect();
        if !stale.is_empty() {
            log::debug!("Discarding {} decode-only frames", stale.len());
        }
        for number in stale {
            self.pending.remove(&number);
        }
        finished
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.pending.clear();
    }
}
