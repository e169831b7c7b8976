//! # Real-Time Workload Library
//!
//! This crate implements a synthetic real-time workload: a periodic video
//! pipeline whose timing is judged by a deadline watchdog, next to an
//! operator-driven CPU load generator that provokes the deadline misses the
//! watchdog reacts to.
//!
//! ## Crate Structure
//!
//! - **`app`**: `Workload`, which assembles every task, runs them and collects
//!   their reports.
//! - **`config`**: layered configuration (defaults, TOML file, environment) via
//!   `figment`. See `config::WorkloadConfig`.
//! - **`control`**: the control task, operator inputs (`Keys`, `Switches`) and
//!   the console stand-in for the board buttons.
//! - **`error`**: the `WorkloadError` enum for initialization failures.
//! - **`load`**: the overload setting and the busy-spin CPU burner.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`run_control`**: the shared run flag observed by every task.
//! - **`video`**: frame store, sources, display sinks, luminance conversion and
//!   the producer / consumer tasks.
//! - **`watchdog`**: the NORMAL / DEGRADED / STOPPED state machine and its
//!   timer task.

pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod load;
pub mod logging;
pub mod run_control;
pub mod video;
pub mod watchdog;

pub use app::{Workload, WorkloadReport};
pub use config::WorkloadConfig;
pub use error::{AppResult, WorkloadError};
pub use run_control::RunControl;
