//! Synthetic CPU load.
//!
//! [`SpinBurner`] is a stress utility, not a scheduling primitive: it keeps the
//! calling thread busy for the requested time without sleeping, yielding or doing
//! I/O. Called from a task of the async runtime it starves every other task
//! sharing that worker, which is how deadline misses are provoked on purpose.

use crate::config::LoadConfig;
use std::time::{Duration, Instant};

/// Something that consumes CPU time on the calling thread.
pub trait CpuBurner: Send + Sync {
    /// Occupy the CPU for approximately `duration`.
    fn burn(&self, duration: Duration);
}

/// Busy-spin on the monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinBurner;

impl CpuBurner for SpinBurner {
    fn burn(&self, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            std::hint::spin_loop();
        }
    }
}

/// Operator-adjustable overload percentage.
///
/// The value moves by `step` and always stays strictly between `min` and `max`:
/// a step that would reach either bound is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadSetting {
    value: u32,
    step: u32,
    min: u32,
    max: u32,
    base_period: Duration,
}

impl OverloadSetting {
    /// Setting at `config.base`.
    pub fn from_config(config: &LoadConfig) -> Self {
        Self {
            value: config.base,
            step: config.step,
            min: config.min,
            max: config.max,
            base_period: config.base_period,
        }
    }

    /// Current percentage.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Raise by one step unless that reaches `max`. Returns whether it moved.
    pub fn increase(&mut self) -> bool {
        match self.value.checked_add(self.step) {
            Some(next) if next < self.max => {
                self.value = next;
                true
            }
            _ => false,
        }
    }

    /// Lower by one step unless that reaches `min`. Returns whether it moved.
    pub fn decrease(&mut self) -> bool {
        match self.value.checked_sub(self.step) {
            Some(next) if next > self.min => {
                self.value = next;
                true
            }
            _ => false,
        }
    }

    /// CPU time to burn per control period: `value * base_period / 100`.
    pub fn burn_duration(&self) -> Duration {
        self.base_period * self.value / 100
    }
}
