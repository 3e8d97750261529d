//! Pacing between effect iterations.
//!
//! The yield to a [`Ticker`] is the only point where a running effect suspends, so it is also
//! where a [`StopSignal`] is honoured.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::foundation::core::Fps;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub trait Ticker {
    /// Blocks until the next iteration may start.
    fn wait_for_tick(&mut self) -> Tick;
}

impl<T: Ticker + ?Sized> Ticker for &mut T {
    fn wait_for_tick(&mut self) -> Tick {
        (**self).wait_for_tick()
    }
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Paces iterations to a fixed rate, sleeping out what is left of each period.
#[derive(Debug)]
pub struct FrameClock {
    period: Duration,
    stop: StopSignal,
    last: Option<Instant>,
}

impl FrameClock {
    pub fn new(fps: Fps, stop: StopSignal) -> Self {
        Self {
            period: fps.frame_duration(),
            stop,
            last: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Ticker for FrameClock {
    fn wait_for_tick(&mut self) -> Tick {
        if self.stop.is_stopped() {
            return Tick::Stop;
        }
        let now = Instant::now();
        let next = match self.last {
            Some(last) => last + self.period,
            None => now,
        };
        if next > now {
            std::thread::sleep(next - now);
        }
        // Falling behind resets the schedule rather than bursting to catch up.
        self.last = Some(next.max(now));
        if self.stop.is_stopped() {
            Tick::Stop
        } else {
            Tick::Continue
        }
    }
}

/// Never waits. Used for offline processing.
#[derive(Clone, Debug, Default)]
pub struct Unpaced {
    stop: StopSignal,
}

impl Unpaced {
    pub fn new(stop: StopSignal) -> Self {
        Self { stop }
    }
}

impl Ticker for Unpaced {
    fn wait_for_tick(&mut self) -> Tick {
        if self.stop.is_stopped() {
            Tick::Stop
        } else {
            Tick::Continue
        }
    }
}

/// Answers `Continue` `n` times, then `Stop`.
///
/// `Effect::run` iterates before each tick, so a run under `FixedTicks::new(n)` performs `n + 1`
/// iterations.
#[derive(Clone, Debug)]
pub struct FixedTicks {
    remaining: u64,
}

impl FixedTicks {
    pub fn new(n: u64) -> Self {
        Self { remaining: n }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Ticker for FixedTicks {
    fn wait_for_tick(&mut self) -> Tick {
        if self.remaining == 0 {
            return Tick::Stop;
        }
        self.remaining -= 1;
        Tick::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ticks_counts_down() {
        let mut t = FixedTicks::new(2);
        assert_eq!(t.wait_for_tick(), Tick::Continue);
        assert_eq!(t.wait_for_tick(), Tick::Continue);
        assert_eq!(t.wait_for_tick(), Tick::Stop);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let mut ticker = Unpaced::new(stop.clone());
        assert_eq!(ticker.wait_for_tick(), Tick::Continue);
        stop.stop();
        assert_eq!(ticker.wait_for_tick(), Tick::Stop);
    }

    #[test]
    fn frame_clock_sleeps_between_ticks() {
        let fps = Fps::new(50, 1).unwrap();
        let mut clock = FrameClock::new(fps, StopSignal::new());
        assert_eq!(clock.period(), Duration::from_millis(20));

        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(clock.wait_for_tick(), Tick::Continue);
        }
        // first tick is immediate, the next two wait a period each
        assert!(start.elapsed() >= Duration::from_millis(38));
    }

    #[test]
    fn frame_clock_honours_stop() {
        let stop = StopSignal::new();
        let mut clock = FrameClock::new(Fps::default(), stop.clone());
        stop.stop();
        assert_eq!(clock.wait_for_tick(), Tick::Stop);
    }
}
