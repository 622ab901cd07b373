// Fixed-rate pacing for velocity commands
//
// Every velocity write goes through exactly one tick, which spaces
// consecutive commands at the configured update period.

use std::thread::sleep;
use std::time::{Duration, Instant};

/// Block until `period` has passed since `last_tick`, then return the new tick
pub fn sleep_until_next_tick(period: Duration, last_tick: Instant) -> Instant {
    let elapsed = last_tick.elapsed();
    if let Some(remaining) = period.checked_sub(elapsed) {
        sleep(remaining);
    }
    Instant::now()
}

pub struct RateLimiter {
    period: Duration,
    last_tick: Option<Instant>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_tick: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Takes effect from the next tick
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// Wait out the rest of the current period. The first tick returns at once.
    pub fn tick(&mut self) -> Instant {
        let now = match self.last_tick {
            Some(last) => sleep_until_next_tick(self.period, last),
            None => Instant::now(),
        };
        self.last_tick = Some(now);
        now
    }
}
