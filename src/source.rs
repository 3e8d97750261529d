use std::collections::VecDeque;

use crate::{
    foundation::{
        core::FrameSize,
        error::{FlowError, FlowResult, ensure_size},
    },
    frame::GrayFrame,
};

/// Supplies successive fixed-size grayscale frames.
pub trait FrameSource {
    fn size(&self) -> FrameSize;

    /// Whether a first frame can be captured now. Polled during start-up; must not block.
    fn poll_ready(&mut self) -> FlowResult<bool> {
        Ok(true)
    }

    /// Next frame. Fails with `SourceUnavailable` once the stream cannot supply more.
    fn capture(&mut self) -> FlowResult<GrayFrame>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn size(&self) -> FrameSize {
        (**self).size()
    }

    fn poll_ready(&mut self) -> FlowResult<bool> {
        (**self).poll_ready()
    }

    fn capture(&mut self) -> FlowResult<GrayFrame> {
        (**self).capture()
    }
}

/// In-memory frames, played once or looped.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    size: FrameSize,
    frames: VecDeque<GrayFrame>,
    looping: bool,
    ready_after_polls: u32,
}

impl FrameSequence {
    pub fn new(size: FrameSize, frames: impl IntoIterator<Item = GrayFrame>) -> FlowResult<Self> {
        size.validate()?;
        let frames: VecDeque<GrayFrame> = frames.into_iter().collect();
        for f in &frames {
            ensure_size(size, f.size())?;
        }
        Ok(Self {
            size,
            frames,
            looping: false,
            ready_after_polls: 0,
        })
    }

    /// Replays the frames from the start when exhausted instead of failing.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Reports "not ready" for the first `polls` readiness checks, like a stream still opening.
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after_polls = polls;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Queues a frame without checking its size, so a misbehaving stream can be simulated.
    pub fn push_unchecked(&mut self, frame: GrayFrame) {
        self.frames.push_back(frame);
    }
}

impl FrameSource for FrameSequence {
    fn size(&self) -> FrameSize {
        self.size
    }

    fn poll_ready(&mut self) -> FlowResult<bool> {
        if self.ready_after_polls > 0 {
            self.ready_after_polls -= 1;
            return Ok(false);
        }
        Ok(!self.frames.is_empty())
    }

    fn capture(&mut self) -> FlowResult<GrayFrame> {
        let frame = self
            .frames
            .pop_front()
            .ok_or_else(|| FlowError::source_unavailable("frame sequence exhausted"))?;
        if self.looping {
            self.frames.push_back(frame.clone());
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(size: FrameSize, n: u8) -> Vec<GrayFrame> {
        (0..n).map(|v| GrayFrame::filled(size, v)).collect()
    }

    #[test]
    fn plays_once_then_reports_unavailable() {
        let size = FrameSize::new(2, 2);
        let mut src = FrameSequence::new(size, frames(size, 2)).unwrap();
        assert_eq!(src.capture().unwrap().get(0, 0), 0);
        assert_eq!(src.capture().unwrap().get(0, 0), 1);
        assert!(src.capture().unwrap_err().is_source_unavailable());
        assert!(!src.poll_ready().unwrap());
    }

    #[test]
    fn looping_wraps_around() {
        let size = FrameSize::new(2, 2);
        let mut src = FrameSequence::new(size, frames(size, 2)).unwrap().looping();
        let seen: Vec<u8> = (0..5).map(|_| src.capture().unwrap().get(0, 0)).collect();
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn ready_after_delays_readiness() {
        let size = FrameSize::new(2, 2);
        let mut src = FrameSequence::new(size, frames(size, 1))
            .unwrap()
            .ready_after(2);
        assert!(!src.poll_ready().unwrap());
        assert!(!src.poll_ready().unwrap());
        assert!(src.poll_ready().unwrap());
    }

    #[test]
    fn rejects_wrong_sized_frames() {
        let size = FrameSize::new(2, 2);
        let other = GrayFrame::filled(FrameSize::new(3, 2), 0);
        assert!(FrameSequence::new(size, [other]).unwrap_err().is_dimension_mismatch());
    }
}
