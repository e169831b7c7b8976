//! Custom error types for the application.
//!
//! This module defines the primary error type, `WorkloadError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the errors that can stop a task or the process.
//!
//! ## Error Hierarchy
//!
//! Only *initialization* failures are represented here. The other failure kinds of
//! the pipeline never surface as errors:
//!
//! - a short read at the end of the frame source rewinds the source,
//! - a deadline overrun becomes a watchdog state transition,
//! - a signal-wait timeout is silently retried.
//!
//! `WorkloadError` consolidates:
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration sources.
//! - **`Configuration`**: Semantic errors caught by `WorkloadConfig::validate`.
//! - **`Io`**: Wraps `std::io::Error` for I/O failures outside of the frame source
//!   and display sink.
//! - **`SourceUnavailable`** / **`SinkUnavailable`**: the backing frame source or the
//!   display surface could not be opened.
//! - **`EmptySource`** / **`FrameSize`**: the frame source cannot deliver a single
//!   complete frame of the configured geometry.
//!
//! By using `#[from]`, `WorkloadError` can be created from underlying error types,
//! simplifying error handling with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, WorkloadError>;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source '{}' unavailable: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Display sink '{}' unavailable: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame source holds no complete frame")]
    EmptySource,

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Tracing initialization failed: {0}")]
    Tracing(String),

    #[error("Task '{task}' did not terminate cleanly: {source}")]
    Join {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl From<figment::Error> for WorkloadError {
    fn from(value: figment::Error) -> Self {
        WorkloadError::Config(Box::new(value))
    }
}

impl WorkloadError {
    /// Whether the error only concerns the task that raised it.
    ///
    /// A producer that cannot open its source stops alone; the rest of the
    /// pipeline keeps running.
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            WorkloadError::SourceUnavailable { .. }
                | WorkloadError::EmptySource
                | WorkloadError::FrameSize { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_failures_are_task_local() {
        let err = WorkloadError::SourceUnavailable {
            path: PathBuf::from("missing.raw"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_task_local());
        assert!(err.to_string().contains("missing.raw"));
        assert!(WorkloadError::EmptySource.is_task_local());
    }

    #[test]
    fn sink_failures_are_process_fatal() {
        let err = WorkloadError::SinkUnavailable {
            path: PathBuf::from("/nonexistent/fb"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_task_local());
        assert!(!WorkloadError::Configuration("bad".into()).is_task_local());
    }

    #[test]
    fn frame_size_message_names_both_sizes() {
        let err = WorkloadError::FrameSize {
            expected: 307_200,
            actual: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("307200"));
        assert!(msg.contains("12"));
    }
}
