//! Video real-time pipeline.
//!
//! ```text
//!  FrameSource ──read──> Producer ──commit──> FrameStore ──signal──> Consumer ──> DisplaySink
//!                          │  ▲                                         (luma)
//!                   arm/disarm│
//!                          ▼  │
//!                        Watchdog
//! ```
//!
//! - [`producer`]: periodic acquisition task, one frame per period, looped playback.
//! - [`consumer`]: signal-driven conversion task, renders only the newest frame.
//! - [`frame_store`]: circular buffer of raw frames plus the converted output.
//! - [`source`] / [`display`]: the backing source and the display surface.
//! - [`luminance`]: RGB0 to single-channel conversion.

pub mod consumer;
pub mod display;
pub mod frame_store;
pub mod luminance;
pub mod pattern;
pub mod producer;
pub mod source;

pub use consumer::{Consumer, ConsumerReport};
pub use display::{DiscardDisplay, DisplaySink, MmapDisplay};
pub use frame_store::FrameStore;
pub use producer::{Producer, ProducerReport, ProducerTiming};
pub use source::{FrameSource, PatternSource, RawFileSource, SourceSpec};

use tokio::sync::watch;

/// Bytes per pixel of the raw RGB0 frames.
pub const RAW_BYTES_PER_PIXEL: usize = 4;

/// Fixed frame geometry, shared by source, store and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameGeometry {
    /// Create a geometry of `width` x `height` pixels.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels of one frame.
    pub const fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one raw RGB0 frame in bytes.
    pub const fn raw_len(&self) -> usize {
        self.pixels() * RAW_BYTES_PER_PIXEL
    }

    /// Size of one converted single-channel frame in bytes.
    pub const fn luma_len(&self) -> usize {
        self.pixels()
    }
}

/// Sending half of the frame-ready signal. Carries the published write index.
pub type FrameNotifier = watch::Sender<u64>;

/// Receiving half of the frame-ready signal.
pub type FrameListener = watch::Receiver<u64>;

/// Create the coalescing frame-ready signal.
///
/// The channel holds a single value: publishing while the consumer is busy
/// replaces the pending notification instead of queueing it, and never blocks
/// the producer.
pub fn frame_signal() -> (FrameNotifier, FrameListener) {
    watch::channel(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_sizes() {
        let geometry = FrameGeometry::new(320, 240);
        assert_eq!(geometry.pixels(), 76_800);
        assert_eq!(geometry.raw_len(), 307_200);
        assert_eq!(geometry.luma_len(), 76_800);
    }

    #[tokio::test]
    async fn signal_coalesces_pending_notifications() {
        let (notifier, mut listener) = frame_signal();
        listener.borrow_and_update();

        notifier.send_replace(1);
        notifier.send_replace(2);
        notifier.send_replace(3);

        // three emissions, one observed event carrying the newest index
        assert!(listener.changed().await.is_ok());
        assert_eq!(*listener.borrow_and_update(), 3);

        let mut pending = tokio_test::task::spawn(listener.changed());
        tokio_test::assert_pending!(pending.poll());
    }
}
