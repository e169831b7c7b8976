//! Backing frame sources.
//!
//! A source delivers fixed-size RGB0 frames sequentially and can be rewound to its
//! first frame. Running out of data is reported as `Ok(false)`, not as an error:
//! the producer turns it into a rewind (looped playback).

use crate::error::{AppResult, WorkloadError};
use crate::video::{pattern, FrameGeometry};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Sequential source of raw frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Fill `frame` with the next frame.
    ///
    /// Returns `Ok(false)` when less than one whole frame remains. The contents of
    /// `frame` are unspecified in that case.
    async fn read_frame(&mut self, frame: &mut [u8]) -> io::Result<bool>;

    /// Restart from the first frame.
    async fn rewind(&mut self) -> io::Result<()>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// How the producer obtains its source. Opening happens inside the producer task
/// so that a missing source only stops that task.
pub enum SourceSpec {
    /// Headerless RGB0 raw video file
    RawFile(PathBuf),
    /// Synthetic animated pattern of the given length
    Pattern {
        /// Frames before the pattern loops
        frames: u64,
    },
    /// Already opened source
    Provided(Box<dyn FrameSource>),
}

impl SourceSpec {
    /// Open the source for frames of the given geometry.
    pub async fn open(self, geometry: FrameGeometry) -> AppResult<Box<dyn FrameSource>> {
        match self {
            SourceSpec::RawFile(path) => {
                let source = RawFileSource::open(&path).await?;
                source.ensure_holds_frame(geometry).await?;
                Ok(Box::new(source))
            }
            SourceSpec::Pattern { frames } => Ok(Box::new(PatternSource::new(geometry, frames))),
            SourceSpec::Provided(source) => Ok(source),
        }
    }
}

impl std::fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::RawFile(path) => f.debug_tuple("RawFile").field(path).finish(),
            SourceSpec::Pattern { frames } => {
                f.debug_struct("Pattern").field("frames", frames).finish()
            }
            SourceSpec::Provided(source) => f.debug_tuple("Provided").field(&source.describe()).finish(),
        }
    }
}

// =============================================================================
// RawFileSource
// =============================================================================

/// Frames read back to back from a raw file, no header.
pub struct RawFileSource {
    path: PathBuf,
    file: File,
}

impl RawFileSource {
    /// Open a raw video file.
    pub async fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|source| WorkloadError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Fail early on a file too short to hold a single frame of `geometry`.
    pub async fn ensure_holds_frame(&self, geometry: FrameGeometry) -> AppResult<()> {
        let actual = self.file.metadata().await?.len() as usize;
        match actual {
            0 => Err(WorkloadError::EmptySource),
            n if n < geometry.raw_len() => Err(WorkloadError::FrameSize {
                expected: geometry.raw_len(),
                actual: n,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FrameSource for RawFileSource {
    async fn read_frame(&mut self, frame: &mut [u8]) -> io::Result<bool> {
        match self.file.read_exact(frame).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn rewind(&mut self) -> io::Result<()> {
        self.file.rewind().await.map(|_| ())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// =============================================================================
// PatternSource
// =============================================================================

/// Finite animated test pattern, replayed identically after each rewind.
#[derive(Debug, Clone)]
pub struct PatternSource {
    geometry: FrameGeometry,
    frames: u64,
    position: u64,
}

impl PatternSource {
    /// Pattern of `frames` frames.
    pub fn new(geometry: FrameGeometry, frames: u64) -> Self {
        Self {
            geometry,
            frames,
            position: 0,
        }
    }
}

#[async_trait]
impl FrameSource for PatternSource {
    async fn read_frame(&mut self, frame: &mut [u8]) -> io::Result<bool> {
        if self.position >= self.frames || frame.len() < self.geometry.raw_len() {
            return Ok(false);
        }
        pattern::fill_test_pattern(frame, self.geometry, self.position);
        self.position += 1;
        Ok(true)
    }

    async fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "test pattern {}x{} ({} frames)",
            self.geometry.width, self.geometry.height, self.frames
        )
    }
}
