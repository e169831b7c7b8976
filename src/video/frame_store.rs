//! Circular store of raw frames with a single converted output buffer.
//!
//! # Access discipline
//!
//! One writer (the producer) and one reader (the consumer):
//!
//! - the producer fills a private staging buffer, then [`FrameStore::commit`] swaps
//!   it into `slots[write_index % N]` and publishes `write_index + 1`;
//! - the consumer only ever reads the slot of the last published index.
//!
//! Slot guards are held for a buffer swap or a conversion only, never across an
//! `.await`. They make concurrent access memory-safe, they do not order the two
//! tasks: a consumer starved for N periods or more reads a slot that has since
//! been refilled and renders a newer frame than the one it was signalled for.

use crate::video::{luminance, FrameGeometry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-capacity circular buffer of raw frames.
pub struct FrameStore {
    geometry: FrameGeometry,
    slots: Box<[Mutex<Box<[u8]>>]>,
    /// Number of frames committed so far (monotonically increasing)
    write_index: AtomicU64,
    output: Mutex<Box<[u8]>>,
}

impl FrameStore {
    /// Allocate `slots` raw frames and one output frame of the given geometry.
    ///
    /// A zero slot count is raised to one. With a single slot, [`commit`]
    /// waits for any conversion in progress, which is why configurations
    /// require at least two.
    ///
    /// [`commit`]: FrameStore::commit
    pub fn new(geometry: FrameGeometry, slots: usize) -> Self {
        let slots = (0..slots.max(1))
            .map(|_| Mutex::new(vec![0u8; geometry.raw_len()].into_boxed_slice()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            geometry,
            slots,
            write_index: AtomicU64::new(0),
            output: Mutex::new(vec![0u8; geometry.luma_len()].into_boxed_slice()),
        }
    }

    /// Frame geometry of every slot.
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Number of slots `N`.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Frames committed since creation.
    pub fn write_index(&self) -> u64 {
        self.write_index.load(Ordering::Acquire)
    }

    /// Slot holding the frame with the given sequence index. Always in `[0, N)`.
    pub fn slot_for(&self, index: u64) -> usize {
        (index % self.slots.len() as u64) as usize
    }

    /// Slot of the most recently completed frame, `None` before the first commit.
    pub fn latest_slot(&self) -> Option<usize> {
        match self.write_index() {
            0 => None,
            published => Some(self.slot_for(published - 1)),
        }
    }

    /// A zeroed buffer of one raw frame, for the producer to read into.
    pub fn staging_buffer(&self) -> Box<[u8]> {
        vec![0u8; self.geometry.raw_len()].into_boxed_slice()
    }

    /// Publish a fully written frame.
    ///
    /// The staging buffer is swapped with the slot at `write_index % N`; on return
    /// it holds the slot's previous contents and can be reused for the next read.
    /// Must only be called by the single producer. Returns the new write index.
    pub fn commit(&self, staging: &mut Box<[u8]>) -> u64 {
        let index = self.write_index.load(Ordering::Relaxed);
        let slot = self.slot_for(index);
        std::mem::swap(&mut *self.slots[slot].lock(), staging);
        self.write_index.store(index + 1, Ordering::Release);
        index + 1
    }

    /// Run `f` over the raw bytes of a slot.
    pub fn with_slot<R>(&self, slot: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.slots[slot].lock())
    }

    /// Convert the newest frame into the output buffer and hand it to `show`.
    ///
    /// Returns `None` when nothing has been committed yet.
    pub fn convert_latest<R>(&self, show: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let slot = self.latest_slot()?;
        let mut output = self.output.lock();
        {
            let raw = self.slots[slot].lock();
            luminance::rgb0_to_luma(&raw, &mut output);
        }
        Some(show(&output))
    }

    /// Copy of the last converted frame.
    pub fn output_snapshot(&self) -> Vec<u8> {
        self.output.lock().to_vec()
    }
}

impl std::fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStore")
            .field("geometry", &self.geometry)
            .field("capacity", &self.capacity())
            .field("write_index", &self.write_index())
            .finish()
    }
}
