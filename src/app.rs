//! Workload orchestration.
//!
//! [`Workload`] wires the pieces together and owns their lifecycle:
//!
//! ```text
//!              ┌──────────── RunControl ─────────────┐
//!              ▼                ▼                    ▼
//!          Producer ────> FrameStore ────> Consumer ────> DisplaySink
//!              │ arm/disarm
//!              ▼
//!          Watchdog ────> StateObserver
//!
//!          ControlTask <── OperatorPanel
//!              └────> CpuBurner
//! ```
//!
//! Construction performs the process-fatal initialisation (the display
//! surface); [`Workload::run`] spawns the tasks, waits for all of them and
//! collects their reports.

use crate::config::WorkloadConfig;
use crate::control::{ControlReport, ControlTask, OperatorPanel};
use crate::error::{AppResult, WorkloadError};
use crate::load::{CpuBurner, SpinBurner};
use crate::run_control::RunControl;
use crate::video::{
    frame_signal, Consumer, ConsumerReport, DiscardDisplay, DisplaySink, FrameStore, MmapDisplay,
    Producer, ProducerReport, ProducerTiming, SourceSpec,
};
use crate::watchdog::{StateObserver, Watchdog, WatchdogHandle, WatchdogSnapshot};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{error, info, info_span, warn, Instrument};

/// Reports of every task, returned once the workload has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Acquisition counters, `None` when the producer failed
    pub producer: Option<ProducerReport>,
    /// Conversion counters
    pub consumer: ConsumerReport,
    /// Control task counters
    pub control: ControlReport,
    /// Final watchdog state
    pub watchdog: WatchdogSnapshot,
}

/// The assembled workload, ready to run.
pub struct Workload {
    config: WorkloadConfig,
    run: RunControl,
    store: Arc<FrameStore>,
    source: SourceSpec,
    display: Box<dyn DisplaySink>,
    burner: Arc<dyn CpuBurner>,
    watchdog: Watchdog,
    watchdog_handle: WatchdogHandle,
    observer: StateObserver,
    handle_interrupt: bool,
}

impl Workload {
    /// Assemble the workload described by `config`.
    ///
    /// Fails when the display surface cannot be created. The frame source is
    /// only opened by the producer once running.
    pub fn new(config: WorkloadConfig) -> AppResult<Self> {
        let geometry = config.video.geometry();

        let display: Box<dyn DisplaySink> = match &config.video.display {
            Some(path) => {
                let surface = MmapDisplay::create(path, geometry)?;
                info!(path = %surface.path().display(), "Display surface mapped");
                Box::new(surface)
            }
            None => Box::new(DiscardDisplay::default()),
        };

        let source = match &config.video.source {
            Some(path) => SourceSpec::RawFile(path.clone()),
            None => SourceSpec::Pattern {
                frames: config.video.pattern_frames,
            },
        };

        let run = RunControl::new();
        let store = Arc::new(FrameStore::new(geometry, config.video.slots));
        let (watchdog, watchdog_handle, observer) =
            Watchdog::new(config.watchdog.quiescence, run.clone());

        Ok(Self {
            config,
            run,
            store,
            source,
            display,
            burner: Arc::new(SpinBurner),
            watchdog,
            watchdog_handle,
            observer,
            handle_interrupt: true,
        })
    }

    /// Replace the frame source.
    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.source = source;
        self
    }

    /// Replace the display sink.
    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    /// Replace the CPU burner.
    pub fn with_burner(mut self, burner: Arc<dyn CpuBurner>) -> Self {
        self.burner = burner;
        self
    }

    /// Do not stop on Ctrl+C.
    pub fn without_interrupt_handler(mut self) -> Self {
        self.handle_interrupt = false;
        self
    }

    /// Shared run flag. Clearing it stops every task within one of its periods.
    pub fn run_control(&self) -> RunControl {
        self.run.clone()
    }

    /// Watchdog state observer.
    pub fn observer(&self) -> StateObserver {
        self.observer.clone()
    }

    /// Frame store shared by the producer and the consumer.
    pub fn frame_store(&self) -> Arc<FrameStore> {
        self.store.clone()
    }

    /// Run every task until the run flag is cleared (exit key, Ctrl+C or
    /// [`RunControl::request_stop`]).
    ///
    /// A producer that fails on its own source is logged and does not stop the
    /// other tasks. Any other producer failure, or any task that panics, stops
    /// the workload; the first such failure is returned once every task has
    /// finished.
    pub async fn run(self, panel: Box<dyn OperatorPanel>) -> AppResult<WorkloadReport> {
        let Workload {
            config,
            run,
            store,
            source,
            display,
            burner,
            watchdog,
            watchdog_handle,
            observer: _,
            handle_interrupt,
        } = self;

        info!("----------------------------------");
        info!("{}", config.application.name);
        info!("----------------------------------");

        let mut tasks = Supervisor::default();
        tasks.spawn(
            "watchdog",
            async move { TaskExit::Watchdog(watchdog.run().await) }.instrument(info_span!("watchdog")),
        );

        let (notifier, listener) = frame_signal();
        let producer = Producer::new(
            source,
            store.clone(),
            notifier,
            watchdog_handle,
            ProducerTiming::from_config(&config.video),
        );
        let producer_run = run.clone();
        tasks.spawn(
            "producer",
            async move { TaskExit::Producer(producer.run(producer_run).await) }
                .instrument(info_span!("producer")),
        );
        info!("Launched video acquisition task");

        let consumer = Consumer::new(store, listener, display);
        let (wait, consumer_run) = (config.video.consumer_timeout, run.clone());
        tasks.spawn(
            "consumer",
            async move { TaskExit::Consumer(consumer.run(wait, consumer_run).await) }
                .instrument(info_span!("consumer")),
        );
        info!("Launched video processing task");

        let control = ControlTask::new(panel, burner, &config.control, &config.load, run.clone());
        tasks.spawn(
            "control",
            async move { TaskExit::Control(control.run().await) }.instrument(info_span!("control")),
        );
        if !config.load.enabled {
            warn!("CPU load generator disabled by configuration");
        }

        let interrupt = handle_interrupt.then(|| tokio::spawn(stop_on_interrupt(run.clone())));

        info!("----------------------------------");
        info!("LOAD switch: enable/disable CPU overload");
        info!("DECREASE key: reduce CPU overload");
        info!("INCREASE key: increase CPU overload");
        info!("EXIT key: exit the program");
        info!("----------------------------------");

        let mut failure = None;
        let mut producer = None;
        let mut consumer = ConsumerReport::default();
        let mut control = ControlReport::default();
        let mut watchdog = WatchdogSnapshot::default();

        // joined in completion order
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskExit::Producer(Ok(report))) => producer = Some(report),
                Ok(TaskExit::Producer(Err(e))) => {
                    error!(error = %e, "Video acquisition task failed");
                    if !e.is_task_local() {
                        run.request_stop();
                        failure.get_or_insert(e);
                    }
                }
                Ok(TaskExit::Consumer(report)) => consumer = report,
                Ok(TaskExit::Control(report)) => control = report,
                Ok(TaskExit::Watchdog(snapshot)) => watchdog = snapshot,
                Err(e) => {
                    run.request_stop();
                    error!(task = e.task, error = %e.source, "Task aborted, stopping the workload");
                    failure.get_or_insert(WorkloadError::Join {
                        task: e.task,
                        source: e.source,
                    });
                }
            }
        }

        if let Some(interrupt) = interrupt {
            interrupt.abort();
        }

        if let Some(e) = failure {
            return Err(e);
        }

        info!("Application has correctly been terminated.");
        Ok(WorkloadReport {
            producer,
            consumer,
            control,
            watchdog,
        })
    }
}

/// Final value of one workload task.
enum TaskExit {
    Producer(AppResult<ProducerReport>),
    Consumer(ConsumerReport),
    Control(ControlReport),
    Watchdog(WatchdogSnapshot),
}

/// A task that panicked or was cancelled.
struct TaskAborted {
    task: &'static str,
    source: JoinError,
}

/// Set of running workload tasks, each tagged with a name.
#[derive(Default)]
struct Supervisor {
    tasks: JoinSet<TaskExit>,
    names: HashMap<task::Id, &'static str>,
}

impl Supervisor {
    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = TaskExit> + Send + 'static,
    {
        let id = self.tasks.spawn(task).id();
        self.names.insert(id, name);
    }

    /// Next task to finish, `None` once every task has been joined.
    async fn join_next(&mut self) -> Option<Result<TaskExit, TaskAborted>> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(match joined {
            Ok((id, exit)) => {
                self.names.remove(&id);
                Ok(exit)
            }
            Err(source) => Err(TaskAborted {
                task: self.names.remove(&source.id()).unwrap_or("unknown"),
                source,
            }),
        })
    }
}

async fn stop_on_interrupt(run: RunControl) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            if run.request_stop() {
                info!("Interrupt received, stopping");
            }
        }
        Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C"),
    }
}
