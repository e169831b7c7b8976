//! Pipeline quality state machine.
//!
//! ```text
//!            miss            miss
//!  Normal ─────────> Degraded ─────────> Stopped ──┐ miss
//!    ▲                 │  ▲                 │  ▲   │
//!    └─────────────────┘  └─────────────────┘  └───┘
//!         recovery             recovery
//! ```
//!
//! Misses degrade one step at a time; every miss (re)starts the quiescence
//! interval, and each quiet interval climbs back one step. Once `Normal` is
//! reached no recovery is pending until the next miss.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Quality state of the video pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    /// Every stage meets its deadline
    #[default]
    Normal,
    /// A deadline has recently been missed
    Degraded,
    /// Deadlines keep being missed
    Stopped,
}

impl PipelineState {
    /// State after a deadline miss.
    pub fn on_deadline_miss(self) -> Self {
        match self {
            PipelineState::Normal => PipelineState::Degraded,
            PipelineState::Degraded | PipelineState::Stopped => PipelineState::Stopped,
        }
    }

    /// State after a quiet quiescence interval.
    pub fn on_recovery(self) -> Self {
        match self {
            PipelineState::Stopped => PipelineState::Degraded,
            PipelineState::Degraded | PipelineState::Normal => PipelineState::Normal,
        }
    }

    /// `true` in `Normal`.
    pub fn is_healthy(self) -> bool {
        self == PipelineState::Normal
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Normal => write!(f, "normal"),
            PipelineState::Degraded => write!(f, "degraded"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// What drove a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// The deadline timer fired, or the cycle completed past its deadline
    DeadlineMiss,
    /// The recovery timer fired
    Recovery,
}

/// One firing of either timer. `from == to` when the state did not move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the firing
    pub from: PipelineState,
    /// State after the firing
    pub to: PipelineState,
    /// Timer that fired
    pub cause: TransitionCause,
}

impl Transition {
    /// Whether the state changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Operator-facing description, `None` when nothing changed.
    pub fn message(&self) -> Option<&'static str> {
        use PipelineState::*;
        match (self.cause, self.from, self.to) {
            (TransitionCause::DeadlineMiss, Normal, Degraded) => {
                Some("Missed deadline: switch to degraded")
            }
            (TransitionCause::DeadlineMiss, Degraded, Stopped) => {
                Some("Missed deadline: switch to stopped")
            }
            (TransitionCause::Recovery, Degraded, Normal) => Some("Revert back to normal"),
            (TransitionCause::Recovery, Stopped, Degraded) => Some("Revert back to degraded"),
            _ => None,
        }
    }
}

/// Point-in-time view of the watchdog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchdogSnapshot {
    /// Current pipeline state
    pub state: PipelineState,
    /// Deadline misses detected since start
    pub misses: u64,
    /// Recovery steps taken since start
    pub recoveries: u64,
}

/// Timer bookkeeping and transition logic, free of any runtime.
///
/// The owning task feeds it commands and timer expirations; every method takes
/// the current instant explicitly, so the whole policy can be driven with
/// synthetic time.
#[derive(Debug, Clone)]
pub struct WatchdogCore {
    state: PipelineState,
    quiescence: Duration,
    deadline: Option<Instant>,
    recovery_due: Option<Instant>,
    misses: u64,
    recoveries: u64,
}

impl WatchdogCore {
    /// Core in `Normal` with no timer pending.
    pub fn new(quiescence: Duration) -> Self {
        Self {
            state: PipelineState::Normal,
            quiescence,
            deadline: None,
            recovery_due: None,
            misses: 0,
            recoveries: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Counters and state.
    pub fn snapshot(&self) -> WatchdogSnapshot {
        WatchdogSnapshot {
            state: self.state,
            misses: self.misses,
            recoveries: self.recoveries,
        }
    }

    /// Quiet time required for one recovery step.
    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    /// Pending acquisition deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Pending recovery check.
    pub fn recovery_due(&self) -> Option<Instant> {
        self.recovery_due
    }

    /// Arm (or re-arm) the one-shot deadline timer.
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Cancel the deadline timer for a cycle that completed at `completed_at`.
    ///
    /// A cycle completing after its deadline counts as a miss even if the timer
    /// has not been serviced yet. Disarming an idle timer does nothing.
    pub fn disarm(&mut self, completed_at: Instant) -> Option<Transition> {
        match self.deadline.take() {
            Some(deadline) if completed_at > deadline => Some(self.miss(completed_at)),
            _ => None,
        }
    }

    /// Service the deadline timer.
    pub fn deadline_elapsed(&mut self, now: Instant) -> Option<Transition> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(self.miss(now))
            }
            _ => None,
        }
    }

    /// Service the recovery timer.
    pub fn recovery_elapsed(&mut self, now: Instant) -> Option<Transition> {
        match self.recovery_due {
            Some(due) if now >= due => Some(self.recover(now)),
            _ => None,
        }
    }

    /// Deadline-timer firing.
    pub fn miss(&mut self, now: Instant) -> Transition {
        let from = self.state;
        self.state = from.on_deadline_miss();
        self.misses += 1;
        self.recovery_due = Some(now + self.quiescence);
        Transition {
            from,
            to: self.state,
            cause: TransitionCause::DeadlineMiss,
        }
    }

    /// Recovery-timer firing.
    pub fn recover(&mut self, now: Instant) -> Transition {
        let from = self.state;
        self.state = from.on_recovery();
        if self.state != from {
            self.recoveries += 1;
        }
        self.recovery_due = if self.state.is_healthy() {
            None
        } else {
            Some(now + self.quiescence)
        };
        Transition {
            from,
            to: self.state,
            cause: TransitionCause::Recovery,
        }
    }
}
