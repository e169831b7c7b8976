//! Integration tests for the video pipeline: looped playback, deadline misses
//! and cooperative shutdown, all on a paused clock.

use async_trait::async_trait;
use rt_workload::config::WorkloadConfig;
use rt_workload::control::{Keys, OperatorPanel, Switches};
use rt_workload::video::pattern::write_pattern_video;
use rt_workload::video::{DiscardDisplay, DisplaySink, FrameGeometry, FrameSource, SourceSpec};
use rt_workload::watchdog::PipelineState;
use rt_workload::{Workload, WorkloadError};
use std::io;
use std::time::Duration;

/// Panel nobody touches.
struct IdlePanel;

impl OperatorPanel for IdlePanel {
    fn read_keys(&mut self) -> Keys {
        Keys::empty()
    }

    fn read_switches(&mut self) -> Switches {
        Switches::empty()
    }
}

fn small_config() -> WorkloadConfig {
    let mut config = WorkloadConfig::default();
    config.video.width = 16;
    config.video.height = 8;
    config.video.source = None;
    config.video.pattern_frames = 4;
    config.load.enabled = false;
    config
}

/// Pattern source taking `stall` to deliver every frame in `stalled`.
struct StallingSource {
    geometry: FrameGeometry,
    position: u64,
    stalled: std::ops::Range<u64>,
    stall: Duration,
}

#[async_trait]
impl FrameSource for StallingSource {
    async fn read_frame(&mut self, frame: &mut [u8]) -> io::Result<bool> {
        if self.stalled.contains(&self.position) {
            tokio::time::sleep(self.stall).await;
        }
        rt_workload::video::pattern::fill_test_pattern(frame, self.geometry, self.position);
        self.position += 1;
        Ok(true)
    }

    async fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        "stalling pattern".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn raw_file_source_loops_forever() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("video.raw");
    let mut config = small_config();
    write_pattern_video(&path, config.video.geometry(), 3).unwrap();
    config.video.source = Some(path);

    let workload = Workload::new(config).unwrap().without_interrupt_handler();
    let run = workload.run_control();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    // 15 fps for 2 s: ~30 frames out of a 3 frame file
    tokio::time::sleep(Duration::from_secs(2)).await;
    run.request_stop();

    let report = task.await.unwrap().unwrap();
    let producer = report.producer.unwrap();
    assert!(producer.frames >= 25, "produced {}", producer.frames);
    assert!(producer.wraps >= 8, "wrapped {}", producer.wraps);
    assert!(report.consumer.rendered >= 1);
}

#[tokio::test(start_paused = true)]
async fn every_task_stops_within_one_period() {
    let workload = Workload::new(small_config())
        .unwrap()
        .without_interrupt_handler();
    let run = workload.run_control();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    run.request_stop();

    // longest period is the consumer's 200 ms signal timeout
    let report = tokio::time::timeout(Duration::from_millis(250), task)
        .await
        .expect("workload did not stop in time")
        .unwrap()
        .unwrap();
    assert!(report.control.polls >= 5);
}

#[tokio::test(start_paused = true)]
async fn stalled_acquisition_degrades_then_recovers() {
    let config = small_config();
    let source = StallingSource {
        geometry: config.video.geometry(),
        position: 0,
        stalled: 10..12,
        stall: Duration::from_millis(150),
    };
    let workload = Workload::new(config)
        .unwrap()
        .with_source(SourceSpec::Provided(Box::new(source)))
        .without_interrupt_handler();
    let run = workload.run_control();
    let mut observer = workload.observer();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    // two consecutive overruns: normal -> degraded -> stopped
    assert_eq!(observer.changed().await.unwrap().state, PipelineState::Degraded);
    assert_eq!(observer.changed().await.unwrap().state, PipelineState::Stopped);

    // quiet from then on: one step back per quiescence interval
    assert_eq!(observer.changed().await.unwrap().state, PipelineState::Degraded);
    assert_eq!(observer.changed().await.unwrap().state, PipelineState::Normal);

    run.request_stop();
    let report = task.await.unwrap().unwrap();
    assert_eq!(report.watchdog.misses, 2);
    assert_eq!(report.watchdog.recoveries, 2);
}

#[tokio::test(start_paused = true)]
async fn missing_source_only_stops_the_producer() {
    let mut config = small_config();
    config.video.source = Some("/nonexistent/video.raw".into());

    let workload = Workload::new(config).unwrap().without_interrupt_handler();
    let run = workload.run_control();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    // the other tasks are still polling
    assert!(run.is_running());
    run.request_stop();

    let report = task.await.unwrap().unwrap();
    assert!(report.producer.is_none());
    assert_eq!(report.consumer.rendered, 0);
    assert!(report.control.polls >= 5);
}

#[test]
fn unwritable_display_is_fatal_at_startup() {
    let mut config = small_config();
    config.video.display = Some("/nonexistent/dir/display.gray".into());

    let err = Workload::new(config).err().unwrap();
    assert!(matches!(err, WorkloadError::SinkUnavailable { .. }));
}

#[tokio::test(start_paused = true)]
async fn provided_display_receives_frames() {
    let workload = Workload::new(small_config())
        .unwrap()
        .with_display(Box::new(DiscardDisplay::default()))
        .without_interrupt_handler();
    let run = workload.run_control();
    let store = workload.frame_store();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    tokio::time::sleep(Duration::from_millis(700)).await;
    run.request_stop();
    let report = task.await.unwrap().unwrap();

    assert_eq!(store.write_index(), report.producer.unwrap().frames);
    assert!(report.consumer.rendered >= 5);
    // the output buffer holds a converted frame
    assert_eq!(store.output_snapshot().len(), 16 * 8);
}

/// Display whose first frame panics the consumer.
struct PanickingDisplay;

impl DisplaySink for PanickingDisplay {
    fn show(&mut self, _frame: &[u8]) -> io::Result<()> {
        panic!("display surface vanished");
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_task_stops_the_workload() {
    let workload = Workload::new(small_config())
        .unwrap()
        .with_display(Box::new(PanickingDisplay))
        .without_interrupt_handler();
    let run = workload.run_control();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("workload kept running after a task panicked")
        .unwrap();

    assert!(!run.is_running());
    match result {
        Err(WorkloadError::Join { task, source }) => {
            assert_eq!(task, "consumer");
            assert!(source.is_panic());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn mapped_display_file_holds_luma_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("display.gray");
    let mut config = small_config();
    config.video.display = Some(path.clone());

    let workload = Workload::new(config).unwrap().without_interrupt_handler();
    let run = workload.run_control();
    let store = workload.frame_store();
    let task = tokio::spawn(workload.run(Box::new(IdlePanel)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    run.request_stop();
    let report = task.await.unwrap().unwrap();
    assert!(report.consumer.rendered >= 1);

    // one luma byte per pixel, last rendered frame
    let shown = std::fs::read(&path).unwrap();
    assert_eq!(shown.len(), 16 * 8);
    assert_eq!(shown, store.output_snapshot());
}
