//! Process-wide run flag shared by every task.
//!
//! The flag is written once, when an exit is requested, and read by every task at
//! its own period boundary. Tasks never block on it: a stop request is noticed at
//! the next boundary, so every task is gone within one of its periods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle on the shared run flag.
#[derive(Debug, Clone)]
pub struct RunControl {
    running: Arc<AtomicBool>,
}

impl RunControl {
    /// Create a handle in the running state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether tasks should keep running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every task to finish its current iteration and return.
    ///
    /// Returns `true` for the call that actually flipped the flag.
    pub fn request_stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
