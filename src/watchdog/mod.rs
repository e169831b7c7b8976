//! Deadline watchdog.
//!
//! Both timers of the watchdog (the per-cycle deadline and the recovery check)
//! live inside one task that owns the [`PipelineState`]. The producer talks to it
//! with [`WatchdogCommand`] messages over an unbounded channel, so arming and
//! disarming never block the producer, and every transition is applied by a
//! single writer in arrival order. Readers get snapshots through a
//! [`StateObserver`].
//!
//! # Example
//!
//! ```rust,ignore
//! let (watchdog, handle, observer) = Watchdog::new(Duration::from_secs(3), run.clone());
//! tokio::spawn(watchdog.run());
//!
//! handle.arm(Instant::now() + period + slack);
//! // ... acquire one frame, wait for the next period ...
//! handle.disarm(Instant::now());
//!
//! println!("pipeline is {}", observer.state());
//! ```

pub mod state;

pub use state::{PipelineState, Transition, TransitionCause, WatchdogCore, WatchdogSnapshot};

use crate::run_control::RunControl;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Messages sent by the acquisition task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    /// A cycle started; it must complete by `deadline`
    Arm {
        /// Absolute deadline of the cycle
        deadline: Instant,
    },
    /// The cycle completed at `completed_at`
    Disarm {
        /// Completion instant of the cycle
        completed_at: Instant,
    },
}

/// Cloneable sender side used by the producer.
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    commands: mpsc::UnboundedSender<WatchdogCommand>,
}

impl WatchdogHandle {
    /// Arm the deadline timer.
    pub fn arm(&self, deadline: Instant) {
        self.send(WatchdogCommand::Arm { deadline });
    }

    /// Disarm the deadline timer.
    pub fn disarm(&self, completed_at: Instant) {
        self.send(WatchdogCommand::Disarm { completed_at });
    }

    fn send(&self, command: WatchdogCommand) {
        // A stopped watchdog no longer judges deadlines.
        if self.commands.send(command).is_err() {
            debug!(?command, "Watchdog gone, command dropped");
        }
    }
}

/// Read-only view of the watchdog state.
#[derive(Debug, Clone)]
pub struct StateObserver {
    snapshots: watch::Receiver<WatchdogSnapshot>,
}

impl StateObserver {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> WatchdogSnapshot {
        *self.snapshots.borrow()
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.snapshot().state
    }

    /// Wait for the next published snapshot. Returns `None` once the watchdog
    /// has terminated.
    pub async fn changed(&mut self) -> Option<WatchdogSnapshot> {
        self.snapshots.changed().await.ok()?;
        Some(*self.snapshots.borrow_and_update())
    }
}

/// State-owning watchdog task.
pub struct Watchdog {
    core: WatchdogCore,
    commands: mpsc::UnboundedReceiver<WatchdogCommand>,
    snapshots: watch::Sender<WatchdogSnapshot>,
    run: RunControl,
}

impl Watchdog {
    /// Create the watchdog in `Normal`, with its command handle and an observer.
    pub fn new(quiescence: Duration, run: RunControl) -> (Self, WatchdogHandle, StateObserver) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let core = WatchdogCore::new(quiescence);
        let (snapshots, snapshots_rx) = watch::channel(core.snapshot());

        (
            Self {
                core,
                commands,
                snapshots,
                run,
            },
            WatchdogHandle {
                commands: commands_tx,
            },
            StateObserver {
                snapshots: snapshots_rx,
            },
        )
    }

    /// Process commands and timer expirations until every handle is dropped or
    /// the run flag is cleared. Returns the final snapshot.
    pub async fn run(mut self) -> WatchdogSnapshot {
        info!(quiescence = ?self.core.quiescence(), "Deadline watchdog started");

        while self.run.is_running() {
            let deadline = self.core.deadline();
            let recovery_due = self.core.recovery_due();

            // Commands first: a disarm already queued carries its own completion
            // instant and settles the deadline without racing the timer.
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(WatchdogCommand::Arm { deadline }) => self.core.arm(deadline),
                    Some(WatchdogCommand::Disarm { completed_at }) => {
                        let transition = self.core.disarm(completed_at);
                        self.apply(transition);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let transition = self.core.deadline_elapsed(Instant::now());
                    self.apply(transition);
                }
                _ = sleep_until(recovery_due.unwrap_or_else(Instant::now)), if recovery_due.is_some() => {
                    let transition = self.core.recovery_elapsed(Instant::now());
                    self.apply(transition);
                }
            }
        }

        let snapshot = self.core.snapshot();
        info!(
            state = %snapshot.state,
            misses = snapshot.misses,
            recoveries = snapshot.recoveries,
            "Deadline watchdog terminated"
        );
        snapshot
    }

    fn apply(&mut self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };

        match transition.message() {
            Some(message) if transition.cause == TransitionCause::DeadlineMiss => {
                warn!(from = %transition.from, to = %transition.to, "{message}")
            }
            Some(message) => info!(from = %transition.from, to = %transition.to, "{message}"),
            None => debug!(state = %transition.to, cause = ?transition.cause, "Watchdog timer fired, state unchanged"),
        }

        self.snapshots.send_replace(self.core.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const PERIOD: Duration = Duration::from_millis(66);
    const QUIET: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn unserviced_deadline_degrades_then_recovers() {
        let run = RunControl::new();
        let (watchdog, handle, mut observer) = Watchdog::new(QUIET, run.clone());
        let task = tokio::spawn(watchdog.run());

        // arm and never disarm: the timer fires on its own
        handle.arm(Instant::now() + PERIOD);
        let snapshot = observer.changed().await.unwrap();
        assert_eq!(snapshot.state, PipelineState::Degraded);
        assert_eq!(snapshot.misses, 1);

        let started = Instant::now();
        let snapshot = observer.changed().await.unwrap();
        assert_eq!(snapshot.state, PipelineState::Normal);
        assert!(Instant::now() - started >= QUIET);

        drop(handle);
        let last = task.await.unwrap();
        assert_eq!(last.recoveries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_time_cycles_leave_state_normal() {
        let run = RunControl::new();
        let (watchdog, handle, observer) = Watchdog::new(QUIET, run);
        let task = tokio::spawn(watchdog.run());

        for _ in 0..20 {
            handle.arm(Instant::now() + PERIOD + Duration::from_millis(2));
            tokio::time::sleep(PERIOD).await;
            handle.disarm(Instant::now());
        }
        tokio::time::sleep(QUIET).await;

        assert_eq!(observer.state(), PipelineState::Normal);
        drop(handle);
        assert_eq!(task.await.unwrap().misses, 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn transitions_are_logged_once() {
        let run = RunControl::new();
        let (watchdog, handle, mut observer) = Watchdog::new(QUIET, run);
        let task = tokio::spawn(watchdog.run());

        handle.arm(Instant::now() + PERIOD);
        observer.changed().await.unwrap();
        // late completion of a second cycle
        let armed_at = Instant::now();
        handle.arm(armed_at + PERIOD);
        handle.disarm(armed_at + PERIOD * 2);
        assert_eq!(observer.changed().await.unwrap().state, PipelineState::Stopped);

        observer.changed().await.unwrap();
        observer.changed().await.unwrap();
        drop(handle);
        task.await.unwrap();

        assert!(logs_contain("Missed deadline: switch to degraded"));
        assert!(logs_contain("Missed deadline: switch to stopped"));
        assert!(logs_contain("Revert back to degraded"));
        assert!(logs_contain("Revert back to normal"));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_run_flag_cleared() {
        let run = RunControl::new();
        let (watchdog, handle, _observer) = Watchdog::new(QUIET, run.clone());
        let task = tokio::spawn(watchdog.run());

        run.request_stop();
        // any wake-up lets the task notice the flag
        handle.arm(Instant::now() + PERIOD);

        let snapshot = tokio::time::timeout(PERIOD, task).await.unwrap().unwrap();
        assert_eq!(snapshot.state, PipelineState::Normal);
    }
}
