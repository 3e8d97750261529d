//! The effect loop: capture, estimate, warp, publish, wait, repeat.

use std::{
    sync::mpsc::{Receiver, Sender, channel},
    time::Instant,
};

use tracing::{debug, info, warn};

use crate::{
    config::EffectConfig,
    flow::MotionEstimator,
    foundation::error::{FlowError, FlowResult, ensure_size},
    frame::{GrayFrame, PixelBuffer},
    schedule::{StopSignal, Tick, Ticker},
    sink::DisplaySink,
    source::FrameSource,
    warp::forward_warp,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    Uninitialized,
    WaitingForSources,
    Running,
    Stopped,
}

/// Which inputs are available right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub frame_source: bool,
    pub still_image: bool,
}

impl Readiness {
    pub const ALL: Self = Self {
        frame_source: true,
        still_image: true,
    };

    pub fn all(self) -> bool {
        self.frame_source && self.still_image
    }
}

impl EffectState {
    /// Next state given the current readiness. `Running` and `Stopped` are only left through
    /// [`EffectState::stop`].
    pub fn advance(self, readiness: Readiness) -> Self {
        match self {
            Self::Uninitialized => Self::WaitingForSources,
            Self::WaitingForSources if readiness.all() => Self::Running,
            other => other,
        }
    }

    pub fn stop(self) -> Self {
        Self::Stopped
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The ticker declined the next tick.
    Ticker,
    /// A [`StopSignal`] was raised.
    Signal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub stopped_by: StopReason,
}

enum Command {
    Reset,
    Snapshot(Sender<PixelBuffer>),
}

/// Cloneable remote control for a running [`Effect`]. Safe to move to other threads.
#[derive(Clone, Debug)]
pub struct EffectHandle {
    commands: Sender<Command>,
    stop: StopSignal,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => f.write_str("Reset"),
            Self::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

impl EffectHandle {
    /// Asks the loop to restore the original still before its next iteration.
    /// Returns `false` once the effect is gone.
    pub fn reset(&self) -> bool {
        self.commands.send(Command::Reset).is_ok()
    }

    /// Asks the loop for a copy of the live buffer. The copy arrives between iterations.
    pub fn request_snapshot(&self) -> Option<Receiver<PixelBuffer>> {
        let (tx, rx) = channel();
        self.commands.send(Command::Snapshot(tx)).ok()?;
        Some(rx)
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

/// One running instance of the smear effect.
///
/// Owns the live pixel buffer and the reference frame. Nothing else mutates them; outside
/// requests travel through an [`EffectHandle`] and are applied between iterations.
pub struct Effect<S, E, K> {
    source: S,
    estimator: E,
    sink: K,
    config: EffectConfig,
    original: PixelBuffer,
    buffer: PixelBuffer,
    reference: GrayFrame,
    state: EffectState,
    iterations: u64,
    commands_tx: Sender<Command>,
    commands: Receiver<Command>,
    stop: StopSignal,
}

impl<S, E, K> Effect<S, E, K>
where
    S: FrameSource,
    E: MotionEstimator,
    K: DisplaySink,
{
    /// Waits for the first frame, seeds the reference from it and shows the still.
    #[tracing::instrument(skip_all, fields(size = %config.size))]
    pub fn start(
        mut source: S,
        estimator: E,
        mut sink: K,
        still: PixelBuffer,
        config: EffectConfig,
    ) -> FlowResult<Self> {
        config.validate()?;
        ensure_size(config.size, still.size())?;
        ensure_size(config.size, source.size())?;

        let mut state = EffectState::Uninitialized.advance(Readiness::default());
        info!(?state, "waiting for first frame");

        let started = Instant::now();
        let mut polls = 0u64;
        loop {
            let readiness = Readiness {
                frame_source: source.poll_ready()?,
                still_image: true,
            };
            state = state.advance(readiness);
            if state == EffectState::Running {
                break;
            }
            if let Some(max_wait) = config.max_wait()
                && started.elapsed() >= max_wait
            {
                return Err(FlowError::source_unavailable(format!(
                    "no frame after waiting {max_wait:?}"
                )));
            }
            polls += 1;
            std::thread::sleep(config.poll_interval());
        }

        let reference = source.capture()?;
        ensure_size(config.size, reference.size())?;
        sink.publish(&still)?;
        info!(?state, polls, "effect running");

        let (commands_tx, commands) = channel();
        Ok(Self {
            source,
            estimator,
            sink,
            config,
            original: still.clone(),
            buffer: still,
            reference,
            state,
            iterations: 0,
            commands_tx,
            commands,
            stop: StopSignal::new(),
        })
    }

    pub fn handle(&self) -> EffectHandle {
        EffectHandle {
            commands: self.commands_tx.clone(),
            stop: self.stop.clone(),
        }
    }

    /// The signal [`Effect::run`] checks; hand it to the ticker too so sleeps end promptly.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn original(&self) -> &PixelBuffer {
        &self.original
    }

    pub fn reference(&self) -> &GrayFrame {
        &self.reference
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Restores the original still. The reference frame and iteration count are untouched.
    pub fn reset(&mut self) {
        self.buffer.clone_from(&self.original);
        debug!(iteration = self.iterations, "buffer reset");
    }

    /// Runs one full iteration without pacing.
    pub fn step(&mut self) -> FlowResult<()> {
        let current = self.iterate()?;
        self.reference = current;
        Ok(())
    }

    /// Iterates until the ticker or the stop signal ends the run, or an iteration fails.
    #[tracing::instrument(skip_all, fields(size = %self.config.size))]
    pub fn run<T: Ticker>(&mut self, ticker: &mut T) -> FlowResult<RunSummary> {
        let stopped_by = loop {
            if self.stop.is_stopped() {
                break StopReason::Signal;
            }
            let current = self.iterate()?;
            let tick = ticker.wait_for_tick();
            self.reference = current;
            if self.stop.is_stopped() {
                break StopReason::Signal;
            }
            if tick == Tick::Stop {
                break StopReason::Ticker;
            }
        };

        self.apply_commands();
        self.state = self.state.stop();
        info!(iterations = self.iterations, ?stopped_by, "effect stopped");
        Ok(RunSummary {
            iterations: self.iterations,
            stopped_by,
        })
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Reset => self.reset(),
                Command::Snapshot(reply) => {
                    // requester may have given up
                    let _ = reply.send(self.buffer.clone());
                }
            }
        }
    }

    /// Pending commands, then steps 1 to 4. Any failure stops the effect.
    fn iterate(&mut self) -> FlowResult<GrayFrame> {
        if self.state != EffectState::Running {
            return Err(FlowError::validation(format!(
                "effect is {:?}, not running",
                self.state
            )));
        }
        self.apply_commands();

        match self.try_iterate() {
            Ok(current) => Ok(current),
            Err(e) => {
                warn!(iteration = self.iterations, "iteration abandoned: {e}");
                self.state = self.state.stop();
                info!(iterations = self.iterations, "effect stopped");
                Err(e)
            }
        }
    }

    fn try_iterate(&mut self) -> FlowResult<GrayFrame> {
        let current = self.source.capture()?;
        ensure_size(self.config.size, current.size())?;

        let field = self
            .estimator
            .estimate(&self.reference, &current, &self.config.flow)?;
        ensure_size(self.config.size, field.size())?;

        let next = forward_warp(&self.buffer, &field, self.config.bounds)?;
        self.sink.publish(&next)?;
        self.buffer = next;
        self.iterations += 1;

        debug!(
            iteration = self.iterations,
            max_motion = field.max_magnitude(),
            "frame published"
        );
        Ok(current)
    }
}
