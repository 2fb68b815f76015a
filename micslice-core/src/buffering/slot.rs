//! `RingSlot`: the unit of double buffering.
//!
//! Samples are stored as `AtomicI16` so the consumer can read a completed slot
//! in place while the producer fills the other one, without a lock and without
//! a copy. Individual sample accesses are `Relaxed`; cross-thread visibility of
//! a whole slot comes from the Release store of the stream's `ready` flag that
//! follows the last write (see `capture::stream`).

use std::sync::atomic::{AtomicI16, AtomicUsize, Ordering};

use crate::buffering::try_alloc_zeroed;
use crate::error::Result;

/// Fixed-capacity sample buffer plus a write cursor.
///
/// Invariant: `cursor <= capacity`. Only the producer moves the cursor.
#[derive(Debug)]
pub struct RingSlot {
    samples: Box<[AtomicI16]>,
    cursor: AtomicUsize,
}

impl RingSlot {
    /// # Errors
    /// `MicsliceError::AllocationFailure` if the sample storage cannot be reserved.
    pub fn try_new(capacity: usize) -> Result<Self> {
        let samples = try_alloc_zeroed::<AtomicI16>(capacity)?.into_boxed_slice();
        Ok(Self {
            samples,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples written since the last reset.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    pub fn is_full(&self) -> bool {
        self.cursor() >= self.capacity()
    }

    /// Append one sample. Returns `true` when this write filled the slot.
    ///
    /// Writing into a full slot is a no-op that also returns `true`.
    #[inline]
    pub fn push(&self, sample: i16) -> bool {
        let at = self.cursor.load(Ordering::Relaxed);
        if at >= self.samples.len() {
            return true;
        }
        self.samples[at].store(sample, Ordering::Relaxed);
        self.cursor.store(at + 1, Ordering::Relaxed);
        at + 1 == self.samples.len()
    }

    /// Rewind the cursor; stale samples stay until overwritten.
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<i16> {
        self.samples.get(index).map(|s| s.load(Ordering::Relaxed))
    }

    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        self.samples.iter().map(|s| s.load(Ordering::Relaxed))
    }
}
