//! Display sinks for converted single-channel frames.

use crate::error::{AppResult, WorkloadError};
use crate::video::FrameGeometry;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Destination of converted frames. Every call replaces the displayed image.
pub trait DisplaySink: Send {
    /// Show one whole single-channel frame.
    fn show(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Display surface backed by a memory-mapped file of exactly one luma frame.
///
/// Any other process mapping the same file (a viewer, a test) sees each frame as
/// soon as it is copied in, the way the board's video memory is.
pub struct MmapDisplay {
    path: PathBuf,
    mmap: MmapMut,
}

impl MmapDisplay {
    /// Create (or reuse) the surface file and map it.
    pub fn create(path: &Path, geometry: FrameGeometry) -> AppResult<Self> {
        let unavailable = |source: io::Error| WorkloadError::SinkUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(unavailable)?;
        file.set_len(geometry.luma_len() as u64).map_err(unavailable)?;

        // SAFETY: the file was just sized to the mapping length; the mapping is only
        // written through `&mut self`.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(unavailable)?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySink for MmapDisplay {
    fn show(&mut self, frame: &[u8]) -> io::Result<()> {
        if frame.len() != self.mmap.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame of {} bytes does not fit a {} byte display",
                    frame.len(),
                    self.mmap.len()
                ),
            ));
        }
        self.mmap.copy_from_slice(frame);
        Ok(())
    }
}

/// Sink that drops frames.
#[derive(Debug, Default)]
pub struct DiscardDisplay;

impl DisplaySink for DiscardDisplay {
    fn show(&mut self, _frame: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmap_display_replaces_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.gray");
        let geometry = FrameGeometry::new(4, 2);

        let mut display = MmapDisplay::create(&path, geometry).unwrap();
        display.show(&[1; 8]).unwrap();
        display.show(&[9; 8]).unwrap();
        display.mmap.flush().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![9; 8]);
    }

    #[test]
    fn mmap_display_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut display =
            MmapDisplay::create(&dir.path().join("display.gray"), FrameGeometry::new(2, 2)).unwrap();
        assert!(display.show(&[0; 3]).is_err());
    }

    #[test]
    fn unwritable_display_is_sink_unavailable() {
        let err = MmapDisplay::create(Path::new("/nonexistent/dir/fb"), FrameGeometry::new(2, 2))
            .err()
            .unwrap();
        assert!(matches!(err, WorkloadError::SinkUnavailable { .. }));
    }
}
