//! Signal-driven conversion task.

use crate::run_control::RunControl;
use crate::video::{DisplaySink, FrameListener, FrameStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

/// Counters returned when the consumer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Frames converted and shown
    pub rendered: u64,
    /// Signal waits that timed out
    pub timeouts: u64,
    /// Frames the display refused
    pub display_errors: u64,
}

/// Waits for the frame-ready signal and shows the newest frame as luma.
///
/// Notifications coalesce: after a stall the consumer renders only the newest
/// committed frame, never a backlog.
pub struct Consumer {
    store: Arc<FrameStore>,
    listener: FrameListener,
    display: Box<dyn DisplaySink>,
    report: ConsumerReport,
}

impl Consumer {
    /// Consumer reading `store` and drawing into `display`.
    pub fn new(store: Arc<FrameStore>, listener: FrameListener, display: Box<dyn DisplaySink>) -> Self {
        Self {
            store,
            listener,
            display,
            report: ConsumerReport::default(),
        }
    }

    /// Counters so far.
    pub fn report(&self) -> ConsumerReport {
        self.report
    }

    /// Convert the newest committed frame and show it.
    ///
    /// Returns `false` when nothing has been committed yet or the display
    /// refused the frame.
    pub fn render_latest(&mut self) -> bool {
        let display = &mut self.display;
        match self.store.convert_latest(|luma| display.show(luma)) {
            None => false,
            Some(Ok(())) => {
                self.report.rendered += 1;
                true
            }
            Some(Err(e)) => {
                self.report.display_errors += 1;
                warn!(error = %e, "Display rejected frame");
                false
            }
        }
    }

    /// Run until the run flag is cleared, waiting at most `wait` per signal so
    /// the flag is observed even when the producer has stalled.
    pub async fn run(mut self, wait: Duration, run: RunControl) -> ConsumerReport {
        while run.is_running() {
            // frames published during the previous conversion are dropped
            self.listener.borrow_and_update();

            match timeout(wait, self.listener.changed()).await {
                Ok(Ok(())) => {
                    let index = *self.listener.borrow_and_update();
                    trace!(index, "Frame ready");
                    self.render_latest();
                }
                Ok(Err(_)) => {
                    // producer gone: nothing will be signalled again
                    sleep(wait).await;
                }
                Err(_) => {
                    self.report.timeouts += 1;
                    debug!(timeouts = self.report.timeouts, "No frame signalled in time");
                }
            }
        }

        info!(
            rendered = self.report.rendered,
            timeouts = self.report.timeouts,
            "Terminating display task"
        );
        self.report
    }
}
