use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use crate::{Error, Result};

/// Paces the sequencer between phases.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Real time, optionally sped up or slowed down.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    pub scale: f64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// Accepted range for [`SystemClock::with_speed`].
pub const SPEEDS: RangeInclusive<f64> = 0.01..=1000.0;

impl SystemClock {
    /// `speed` of 2.0 runs phases twice as fast.
    pub fn with_speed(speed: f64) -> Result<Self> {
        if !SPEEDS.contains(&speed) {
            return Err(Error::Config(format!(
                "speed {} outside {}..={}",
                speed,
                SPEEDS.start(),
                SPEEDS.end()
            )));
        }
        Ok(Self { scale: 1.0 / speed })
    }
}

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        let scaled = Duration::try_from_secs_f64(duration.as_secs_f64() * self.scale);
        thread::sleep(scaled.unwrap_or(duration));
    }
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantClock;

impl Clock for InstantClock {
    fn sleep(&self, _duration: Duration) {}
}
