use std::cell::Cell;

use flowwarp::{
    Displacement, DisplaySink, Effect, EffectConfig, EffectState, FixedTicks, FlowParams,
    FlowResult, FrameSequence, FrameSize, FrameSource, GrayFrame, LatestFrameSink,
    MotionEstimator, MotionField, PixelBuffer, PyramidLucasKanade, StopReason, ZeroMotion,
    color::gray_from_pixels,
};

fn config(size: FrameSize) -> EffectConfig {
    EffectConfig {
        size,
        poll_interval_ms: 1,
        ..EffectConfig::default()
    }
}

fn distinct(size: FrameSize) -> PixelBuffer {
    PixelBuffer::from_fn(size, |r, c| {
        let n = (r * size.width as usize + c) as u8;
        [n * 15, 255 - n * 15, n, 255]
    })
}

/// Always returns the same field, whatever the frames.
struct FixedField(MotionField);

impl MotionEstimator for FixedField {
    fn estimate(
        &self,
        _reference: &GrayFrame,
        _current: &GrayFrame,
        _params: &FlowParams,
    ) -> FlowResult<MotionField> {
        Ok(self.0.clone())
    }
}

/// Records every pair it was asked about by the first pixel of each frame.
struct Recording<'a> {
    seen: &'a Cell<Vec<(u8, u8)>>,
}

impl MotionEstimator for Recording<'_> {
    fn estimate(
        &self,
        reference: &GrayFrame,
        current: &GrayFrame,
        _params: &FlowParams,
    ) -> FlowResult<MotionField> {
        let mut seen = self.seen.take();
        seen.push((reference.get(0, 0), current.get(0, 0)));
        self.seen.set(seen);
        Ok(MotionField::from_fn(reference.size(), |_, _| {
            Displacement::new(0.0, 1.0)
        }))
    }
}

/// Fails every publish after the first `allowed`.
struct FlakySink {
    inner: LatestFrameSink,
    allowed: usize,
}

impl DisplaySink for FlakySink {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        if self.allowed == 0 {
            return Err(flowwarp::FlowError::io("display went away"));
        }
        self.allowed -= 1;
        self.inner.publish(buffer)
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.inner.snapshot()
    }
}

#[test]
fn identical_frames_leave_buffer_unchanged() {
    let size = FrameSize::square(4);
    let still = distinct(size);
    let frame = gray_from_pixels(&still).unwrap();
    let source = FrameSequence::new(size, [frame.clone(), frame]).unwrap();

    let mut effect = Effect::start(
        source,
        PyramidLucasKanade::new(),
        LatestFrameSink::new(),
        still.clone(),
        config(size),
    )
    .unwrap();
    effect.step().unwrap();

    assert_eq!(effect.buffer(), &still);
    assert_eq!(effect.sink().snapshot(), Some(still));
    assert_eq!(effect.sink().published(), 2);
}

#[test]
fn two_by_two_scenario_through_the_loop() {
    let size = FrameSize::square(2);
    let (a, b, c, d) = ([1, 1, 1, 255], [2, 2, 2, 255], [3, 3, 3, 255], [4, 4, 4, 255]);
    let still = PixelBuffer::new(size, [a, b, c, d].concat()).unwrap();
    let field =
        MotionField::from_rows(&[&[(0.0, 0.0), (1.0, 0.0)], &[(0.0, 0.0), (0.0, 0.0)]]).unwrap();
    let source = FrameSequence::new(size, (0..2).map(|_| GrayFrame::filled(size, 0))).unwrap();

    let mut effect =
        Effect::start(source, FixedField(field), LatestFrameSink::new(), still, config(size))
            .unwrap();
    effect.step().unwrap();
    assert_eq!(effect.buffer().as_raw(), [a, b, c, b].concat().as_slice());
}

#[test]
fn reset_is_idempotent_and_keeps_reference() {
    let size = FrameSize::square(3);
    let still = distinct(size);
    let frames = (1..=4).map(|v| GrayFrame::filled(size, v));
    let source = FrameSequence::new(size, frames).unwrap();
    let seen = Cell::new(Vec::new());

    let mut effect = Effect::start(
        source,
        Recording { seen: &seen },
        LatestFrameSink::new(),
        still.clone(),
        config(size),
    )
    .unwrap();
    effect.step().unwrap();
    assert_ne!(effect.buffer(), &still);

    effect.reset();
    let once = effect.buffer().clone();
    effect.reset();
    assert_eq!(effect.buffer(), &once);
    assert_eq!(once, still);
    assert_eq!(effect.reference().get(0, 0), 2);
    assert_eq!(effect.iterations(), 1);

    effect.step().unwrap();
    // the pair after the reset still starts from the frame before it
    assert_eq!(seen.take(), vec![(1, 2), (2, 3)]);
}

#[test]
fn reset_through_handle_applies_before_next_iteration() {
    let size = FrameSize::square(3);
    let still = distinct(size);
    let source = FrameSequence::new(size, (0..5).map(|_| GrayFrame::filled(size, 9))).unwrap();
    let seen = Cell::new(Vec::new());

    let mut effect = Effect::start(
        source,
        Recording { seen: &seen },
        LatestFrameSink::new(),
        still.clone(),
        config(size),
    )
    .unwrap();
    let handle = effect.handle();
    effect.step().unwrap();
    effect.step().unwrap();
    let twice = effect.buffer().clone();

    handle.reset();
    handle.reset();
    effect.step().unwrap();

    // one shift from the original, not three
    let mut expected = effect.original().clone();
    for r in 0..3 {
        for c in (1..3).rev() {
            expected.set_pixel(r, c, still.pixel(r, c - 1));
        }
    }
    assert_eq!(effect.buffer(), &expected);
    assert_ne!(effect.buffer(), &twice);
}

#[test]
fn failed_publish_keeps_last_good_buffer() {
    let size = FrameSize::square(3);
    let still = distinct(size);
    let source = FrameSequence::new(size, (0..5).map(|_| GrayFrame::filled(size, 9))).unwrap();
    let seen = Cell::new(Vec::new());
    let sink = FlakySink {
        inner: LatestFrameSink::new(),
        // the initial still plus one iteration
        allowed: 2,
    };

    let mut effect =
        Effect::start(source, Recording { seen: &seen }, sink, still, config(size)).unwrap();
    effect.step().unwrap();
    let good = effect.buffer().clone();

    let err = effect.run(&mut FixedTicks::new(10)).unwrap_err();
    assert!(err.to_string().contains("display went away"));
    assert_eq!(effect.buffer(), &good);
    assert_eq!(effect.iterations(), 1);
    assert_eq!(effect.state(), EffectState::Stopped);
}

/// A source whose frames change size partway through.
struct Shrinking {
    inner: FrameSequence,
}

impl FrameSource for Shrinking {
    fn size(&self) -> FrameSize {
        self.inner.size()
    }

    fn capture(&mut self) -> FlowResult<GrayFrame> {
        self.inner.capture()
    }
}

#[test]
fn source_dimension_change_stops_the_loop() {
    let size = FrameSize::square(4);
    let mut inner = FrameSequence::new(size, (0..2).map(|_| GrayFrame::filled(size, 1))).unwrap();
    inner.push_unchecked(GrayFrame::filled(FrameSize::new(4, 3), 1));

    let mut effect = Effect::start(
        Shrinking { inner },
        ZeroMotion,
        LatestFrameSink::new(),
        distinct(size),
        config(size),
    )
    .unwrap();
    let err = effect.run(&mut FixedTicks::new(10)).unwrap_err();
    assert!(err.is_dimension_mismatch());
    assert_eq!(effect.iterations(), 1);
    assert_eq!(effect.state(), EffectState::Stopped);
}

#[test]
fn snapshot_through_handle_sees_whole_buffer() {
    let size = FrameSize::square(4);
    let still = distinct(size);
    let source = FrameSequence::new(size, [GrayFrame::filled(size, 0)])
        .unwrap()
        .looping();

    let mut effect =
        Effect::start(source, ZeroMotion, LatestFrameSink::new(), still.clone(), config(size))
            .unwrap();
    let handle = effect.handle();
    let rx = handle.request_snapshot().unwrap();

    let summary = effect.run(&mut FixedTicks::new(3)).unwrap();
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.stopped_by, StopReason::Ticker);
    assert_eq!(rx.recv().unwrap(), still);
}

#[test]
fn start_polls_until_source_is_ready() {
    let size = FrameSize::square(2);
    let source = FrameSequence::new(size, (0..2).map(|_| GrayFrame::filled(size, 3)))
        .unwrap()
        .ready_after(3);

    let effect = Effect::start(
        source,
        ZeroMotion,
        LatestFrameSink::new(),
        distinct(size),
        config(size),
    )
    .unwrap();
    assert_eq!(effect.state(), EffectState::Running);
    assert_eq!(effect.reference().get(1, 1), 3);
}

#[test]
fn stop_from_another_thread_ends_paced_run() {
    let size = FrameSize::square(2);
    let source = FrameSequence::new(size, [GrayFrame::filled(size, 0)])
        .unwrap()
        .looping();
    let mut effect =
        Effect::start(source, ZeroMotion, LatestFrameSink::new(), distinct(size), config(size))
            .unwrap();
    let handle = effect.handle();
    let mut clock = flowwarp::FrameClock::new(flowwarp::Fps::new(200, 1).unwrap(), handle.stop_signal());

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(30));
        handle.stop();
    });
    let summary = effect.run(&mut clock).unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.stopped_by, StopReason::Signal);
    assert!(summary.iterations >= 1);
}

#[test]
fn fixed_ticks_bound_iterations_to_one_more_than_ticks() {
    let size = FrameSize::square(2);
    for ticks in [0u64, 1, 5] {
        let source = FrameSequence::new(size, [GrayFrame::filled(size, 7)])
            .unwrap()
            .looping();
        let mut effect =
            Effect::start(source, ZeroMotion, LatestFrameSink::new(), distinct(size), config(size))
                .unwrap();
        let summary = effect.run(&mut FixedTicks::new(ticks)).unwrap();
        assert_eq!(summary.iterations, ticks + 1);
        assert_eq!(summary.stopped_by, StopReason::Ticker);
    }
}
