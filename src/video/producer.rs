//! Periodic acquisition task.
//!
//! Once per frame period the producer reads the next raw frame from its source
//! into a staging buffer, commits it to the [`FrameStore`] and publishes the new
//! write index on the frame-ready signal. Reaching the end of the source rewinds
//! it (looped playback).
//!
//! Every cycle is watched: the deadline is armed when the cycle starts and
//! disarmed once the producer is back at its next release point, so the read,
//! the commit and the period wait together must fit in `period + slack`.

use crate::config::VideoConfig;
use crate::error::{AppResult, WorkloadError};
use crate::run_control::RunControl;
use crate::video::{FrameNotifier, FrameSource, FrameStore, SourceSpec};
use crate::watchdog::WatchdogHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Period and deadline budget of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerTiming {
    /// Time between two release points
    pub period: Duration,
    /// Extra time granted on top of the period before a cycle counts as missed
    pub slack: Duration,
}

impl ProducerTiming {
    /// Timing from the video section of the configuration.
    pub fn from_config(video: &VideoConfig) -> Self {
        Self {
            period: video.frame_period(),
            slack: video.deadline_slack,
        }
    }

    /// Budget of one cycle.
    pub fn budget(&self) -> Duration {
        self.period + self.slack
    }
}

/// Counters returned when the producer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Frames committed to the store
    pub frames: u64,
    /// Times the source was rewound after running out of frames
    pub wraps: u64,
}

/// The acquisition task.
pub struct Producer {
    source: SourceSpec,
    store: Arc<FrameStore>,
    signal: FrameNotifier,
    watchdog: WatchdogHandle,
    timing: ProducerTiming,
}

impl Producer {
    /// Producer writing into `store` and notifying through `signal`.
    pub fn new(
        source: SourceSpec,
        store: Arc<FrameStore>,
        signal: FrameNotifier,
        watchdog: WatchdogHandle,
        timing: ProducerTiming,
    ) -> Self {
        Self {
            source,
            store,
            signal,
            watchdog,
            timing,
        }
    }

    /// Run until the run flag is cleared.
    ///
    /// Opening the source happens here, so a missing or empty source ends this
    /// task with an error and leaves the rest of the pipeline running.
    pub async fn run(self, run: RunControl) -> AppResult<ProducerReport> {
        let Producer {
            source,
            store,
            signal,
            watchdog,
            timing,
        } = self;

        let mut acquisition = Acquisition {
            source: source.open(store.geometry()).await?,
            staging: store.staging_buffer(),
            store,
            signal,
            report: ProducerReport::default(),
        };
        info!(
            source = %acquisition.source.describe(),
            period = ?timing.period,
            slack = ?timing.slack,
            "Video acquisition started"
        );

        let mut ticker = interval(timing.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        while run.is_running() {
            watchdog.arm(Instant::now() + timing.budget());
            acquisition.acquire().await?;
            ticker.tick().await;
            watchdog.disarm(Instant::now());
        }

        let report = acquisition.report;
        info!(frames = report.frames, wraps = report.wraps, "Terminating video task.");
        Ok(report)
    }
}

struct Acquisition {
    source: Box<dyn FrameSource>,
    staging: Box<[u8]>,
    store: Arc<FrameStore>,
    signal: FrameNotifier,
    report: ProducerReport,
}

impl Acquisition {
    /// Read, commit and publish one frame. Returns the new write index.
    async fn acquire(&mut self) -> AppResult<u64> {
        if !self.source.read_frame(&mut self.staging).await? {
            self.source.rewind().await?;
            self.report.wraps += 1;
            debug!(wraps = self.report.wraps, "End of frame source, rewinding");

            if !self.source.read_frame(&mut self.staging).await? {
                return Err(WorkloadError::EmptySource);
            }
        }

        let index = self.store.commit(&mut self.staging);
        self.signal.send_replace(index);
        self.report.frames += 1;
        Ok(index)
    }
}
