//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the workload generator.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. compiled-in defaults (the reference board settings)
//! 2. a TOML file (`config/workload.toml` by default)
//! 3. Environment variables (prefixed with `RT_WORKLOAD_`, nested keys split on `__`)
//!
//! Durations are written in human-readable form (`"66ms"`, `"3s"`).
//!
//! # Example
//! ```no_run
//! use rt_workload::config::WorkloadConfig;
//!
//! let config = WorkloadConfig::load()?;
//! println!("Frame period: {:?}", config.video.frame_period());
//! # Ok::<(), rt_workload::error::WorkloadError>(())
//! ```

use crate::error::{AppResult, WorkloadError};
use crate::video::FrameGeometry;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/workload.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "RT_WORKLOAD_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Async runtime settings
    pub runtime: RuntimeConfig,
    /// Video pipeline settings
    pub video: VideoConfig,
    /// Deadline watchdog settings
    pub watchdog: WatchdogConfig,
    /// Control task settings
    pub control: ControlConfig,
    /// Synthetic CPU load settings
    pub load: LoadConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rt-workload".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Tokio runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of executor threads. One thread reproduces the single contended CPU
    /// the load generator is meant to starve.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: 1 }
    }
}

/// Video pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second produced by the acquisition task
    pub frame_rate: u32,
    /// Number of slots of the circular frame store
    pub slots: usize,
    /// Raw RGB0 video file. `None` selects the synthetic pattern source.
    pub source: Option<PathBuf>,
    /// Number of frames of the synthetic pattern source before it loops
    pub pattern_frames: u64,
    /// Memory-mapped display surface. `None` discards converted frames.
    pub display: Option<PathBuf>,
    /// Slack added to the frame period to form the acquisition deadline
    #[serde(with = "humantime_serde")]
    pub deadline_slack: Duration,
    /// Bounded wait of the consumer on the frame-ready signal
    #[serde(with = "humantime_serde")]
    pub consumer_timeout: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frame_rate: 15,
            slots: 2,
            source: Some(PathBuf::from("output_video.raw")),
            pattern_frames: 300,
            display: None,
            deadline_slack: Duration::from_millis(2),
            consumer_timeout: Duration::from_millis(200),
        }
    }
}

impl VideoConfig {
    /// Interval between two acquisition attempts, `1 / frame_rate`.
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frame_rate.max(1)))
    }

    /// Frame geometry shared by the source, the store and the display.
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }
}

/// Deadline watchdog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Time spent without a new miss before the state climbs back one step
    #[serde(with = "humantime_serde")]
    pub quiescence: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_secs(3),
        }
    }
}

/// Control task configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Polling period of the operator inputs
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
        }
    }
}

/// Synthetic CPU load configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Master gate of the busy-spin. Tests switch it off.
    pub enabled: bool,
    /// Initial overload percentage
    pub base: u32,
    /// Increment applied by one increase / decrease event
    pub step: u32,
    /// Exclusive lower bound of the overload percentage
    pub min: u32,
    /// Exclusive upper bound of the overload percentage
    pub max: u32,
    /// Period the overload percentage applies to
    #[serde(with = "humantime_serde")]
    pub base_period: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base: 20,
            step: 10,
            min: 0,
            max: 100,
            base_period: Duration::from_millis(100),
        }
    }
}

impl WorkloadConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error: defaults and environment still apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Layered configuration sources, exposed for callers that add their own
    /// providers (command line overrides).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(WorkloadConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(WorkloadError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.runtime.worker_threads == 0 {
            return invalid("runtime.worker_threads must be at least 1".to_string());
        }

        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return invalid(format!(
                "Frame geometry must be non-zero, got {}x{}",
                video.width, video.height
            ));
        }
        if video.frame_rate == 0 {
            return invalid("video.frame_rate must be positive".to_string());
        }
        if video.slots < 2 {
            return invalid(format!("video.slots must be at least 2, got {}", video.slots));
        }
        if video.source.is_none() && video.pattern_frames == 0 {
            return invalid("video.pattern_frames must be positive".to_string());
        }
        if video.consumer_timeout.is_zero() {
            return invalid("video.consumer_timeout must be positive".to_string());
        }

        if self.watchdog.quiescence.is_zero() {
            return invalid("watchdog.quiescence must be positive".to_string());
        }
        if self.control.period.is_zero() {
            return invalid("control.period must be positive".to_string());
        }

        let load = &self.load;
        if load.step == 0 {
            return invalid("load.step must be positive".to_string());
        }
        if load.base <= load.min || load.base >= load.max {
            return invalid(format!(
                "load.base {} must lie strictly between load.min {} and load.max {}",
                load.base, load.min, load.max
            ));
        }
        if load.max > 100 {
            return invalid(format!(
                "load.max {} exceeds 100: the overload is a percentage of load.base_period",
                load.max
            ));
        }
        if load.base_period.is_zero() {
            return invalid("load.base_period must be positive".to_string());
        }

        Ok(())
    }
}
