//! Double-buffered streaming capture.
//!
//! ## Slot hand-off
//!
//! ```text
//! producer thread                          consumer (caller thread)
//! ───────────────                          ────────────────────────
//! read_chunk → scale → slots[active]       wait_for_slice():
//! slot full:                                 poll ready (1 ms sleeps)
//!   ready already set? → overruns += 1       ready.swap(false)
//!   active ^= 1, reset new cursor            read slots[active ^ 1] in place
//!   ready.store(true, Release)
//! ```
//!
//! `ready` is the only synchronisation between the two sides. The producer
//! finishes every write to a slot before the Release store, and the consumer's
//! Acquire load makes those writes visible. The producer never waits for the
//! consumer: an unconsumed slice is overwritten and counted as an overrun.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    audio::{scale_raw_sample, PeripheralHandle},
    buffering::{try_alloc_zeroed, RingSlot},
    error::{MicsliceError, Result},
};

#[derive(Default)]
pub struct StreamDiagnostics {
    pub chunks_read: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub slices_completed: AtomicUsize,
    pub overruns: AtomicUsize,
    pub failed_reads: AtomicUsize,
    pub empty_reads: AtomicUsize,
    pub late_waits: AtomicUsize,
}

impl StreamDiagnostics {
    pub fn reset(&self) {
        self.chunks_read.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.slices_completed.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.failed_reads.store(0, Ordering::Relaxed);
        self.empty_reads.store(0, Ordering::Relaxed);
        self.late_waits.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            slices_completed: self.slices_completed.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            failed_reads: self.failed_reads.load(Ordering::Relaxed),
            empty_reads: self.empty_reads.load(Ordering::Relaxed),
            late_waits: self.late_waits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub chunks_read: usize,
    pub samples_in: usize,
    pub slices_completed: usize,
    pub overruns: usize,
    pub failed_reads: usize,
    pub empty_reads: usize,
    pub late_waits: usize,
}

/// State shared by the producer thread and the `SliceConsumer`.
pub struct StreamShared {
    slots: [RingSlot; 2],
    /// Index of the slot the producer is writing.
    active: AtomicUsize,
    /// A completed slice is waiting in `slots[active ^ 1]`.
    ready: AtomicBool,
    running: AtomicBool,
    pub diagnostics: StreamDiagnostics,
}

impl StreamShared {
    /// # Errors
    /// `MicsliceError::InvalidArgument` for a zero slice size,
    /// `MicsliceError::AllocationFailure` if either slot cannot be allocated.
    pub fn try_new(slice_samples: usize) -> Result<Self> {
        if slice_samples == 0 {
            return Err(MicsliceError::InvalidArgument(
                "slice size must be at least one sample".into(),
            ));
        }
        Ok(Self {
            slots: [
                RingSlot::try_new(slice_samples)?,
                RingSlot::try_new(slice_samples)?,
            ],
            active: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            running: AtomicBool::new(false),
            diagnostics: StreamDiagnostics::default(),
        })
    }

    pub fn slice_samples(&self) -> usize {
        self.slots[0].capacity()
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn slot(&self, index: usize) -> &RingSlot {
        &self.slots[index & 1]
    }

    /// Append one scaled sample to the active slot, flipping on completion.
    ///
    /// Producer side only.
    pub fn push_sample(&self, sample: i16) {
        let active = self.active.load(Ordering::Relaxed);
        if !self.slots[active].push(sample) {
            return;
        }

        if self.ready.load(Ordering::Acquire) {
            let total = self.diagnostics.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(overruns = total, "slice overwritten before it was consumed");
        }

        let next = active ^ 1;
        self.slots[next].reset();
        self.active.store(next, Ordering::Release);
        self.ready.store(true, Ordering::Release);
        self.diagnostics
            .slices_completed
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the streaming producer thread.
pub struct StreamCapture {
    shared: Option<Arc<StreamShared>>,
    handle: Option<JoinHandle<()>>,
}

/// Producer parameters copied from `CaptureConfig`.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub chunk_samples: usize,
    pub warmup: Duration,
    pub slice_poll: Duration,
}

impl StreamCapture {
    pub fn new() -> Self {
        Self {
            shared: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn shared(&self) -> Option<&Arc<StreamShared>> {
        self.shared.as_ref()
    }

    /// Allocate both slots and launch the producer.
    ///
    /// # Errors
    /// - `MicsliceError::AlreadyStreaming` if a producer is running.
    /// - `MicsliceError::AllocationFailure` / `InvalidArgument` from slot setup.
    pub fn start(
        &mut self,
        peripheral: PeripheralHandle,
        slice_samples: usize,
        settings: StreamSettings,
    ) -> Result<SliceConsumer> {
        if self.is_running() {
            return Err(MicsliceError::AlreadyStreaming);
        }
        // A previous session that was never stopped explicitly.
        self.stop();

        let shared = Arc::new(StreamShared::try_new(slice_samples)?);
        let mut raw = try_alloc_zeroed::<i32>(settings.chunk_samples.max(1))?;

        peripheral.0.lock().discard_pending();
        shared.running.store(true, Ordering::SeqCst);

        let producer = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("micslice-stream".into())
            .spawn(move || {
                if !settings.warmup.is_zero() {
                    thread::sleep(settings.warmup);
                }
                run_producer(&producer, &peripheral, &mut raw);
            })
            .map_err(|e| {
                shared.running.store(false, Ordering::SeqCst);
                MicsliceError::Io(e)
            })?;

        info!(slice_samples, "stream capture started");
        self.shared = Some(Arc::clone(&shared));
        self.handle = Some(handle);

        Ok(SliceConsumer {
            shared,
            poll: settings.slice_poll,
        })
    }

    /// Request termination and wait for the producer to leave its read loop.
    ///
    /// No-op when nothing is running. Slot memory is released once the last
    /// `SliceConsumer` for this session is dropped.
    pub fn stop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("stream producer panicked");
            }
        }
        let snap = shared.diagnostics.snapshot();
        info!(
            slices = snap.slices_completed,
            overruns = snap.overruns,
            "stream capture stopped"
        );
    }
}

impl Default for StreamCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_producer(shared: &StreamShared, peripheral: &PeripheralHandle, raw: &mut [i32]) {
    debug!("stream producer running");

    while shared.running.load(Ordering::Acquire) {
        let read = peripheral.0.lock().read_chunk(raw);

        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        let n = match read {
            Ok(0) => {
                shared.diagnostics.empty_reads.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Ok(n) => n.min(raw.len()),
            Err(e) => {
                let failed = shared.diagnostics.failed_reads.fetch_add(1, Ordering::Relaxed);
                if failed == 0 {
                    warn!("peripheral read failed: {e}");
                }
                continue;
            }
        };

        shared.diagnostics.chunks_read.fetch_add(1, Ordering::Relaxed);
        shared.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        for &word in &raw[..n] {
            shared.push_sample(scale_raw_sample(word));
        }
    }

    debug!("stream producer exiting");
}

/// Consumer side of a streaming session.
///
/// Cloning is deliberately not offered: one consumer per session.
pub struct SliceConsumer {
    shared: Arc<StreamShared>,
    poll: Duration,
}

impl SliceConsumer {
    /// Block until the next completed slice and borrow it in place.
    ///
    /// The returned `Slice` borrows `self`, so it cannot outlive the next call.
    ///
    /// # Errors
    /// - `MicsliceError::SliceNotReady` if a slice was already waiting on entry:
    ///   the caller fell behind. The stale slice is dropped so the following
    ///   call waits for a fresh one.
    /// - `MicsliceError::NotRunning` if the capture stops while waiting.
    pub fn wait_for_slice(&mut self) -> Result<Slice<'_>> {
        if self.shared.ready.swap(false, Ordering::AcqRel) {
            self.shared
                .diagnostics
                .late_waits
                .fetch_add(1, Ordering::Relaxed);
            return Err(MicsliceError::SliceNotReady);
        }

        loop {
            if self.shared.ready.swap(false, Ordering::AcqRel) {
                break;
            }
            if !self.shared.is_running() {
                return Err(MicsliceError::NotRunning);
            }
            thread::sleep(self.poll);
        }

        let index = self.shared.active.load(Ordering::Acquire) ^ 1;
        Ok(Slice {
            slot: &self.shared.slots[index],
            index,
        })
    }

    /// Non-blocking peek at the ready flag.
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn overruns(&self) -> usize {
        self.shared.diagnostics.overruns.load(Ordering::Relaxed)
    }

    pub fn slice_samples(&self) -> usize {
        self.shared.slice_samples()
    }

    pub fn diagnostics(&self) -> StreamSnapshot {
        self.shared.diagnostics.snapshot()
    }
}

/// A completed slice, read in place from the producer's slot.
pub struct Slice<'a> {
    slot: &'a RingSlot,
    index: usize,
}

impl Slice<'_> {
    /// Which of the two slots this slice lives in.
    pub fn slot_index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.slot.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.capacity() == 0
    }

    pub fn get(&self, index: usize) -> Option<i16> {
        self.slot.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        self.slot.iter()
    }

    /// Widen into `out` as floats (plain cast, no normalisation).
    ///
    /// # Errors
    /// `MicsliceError::InvalidArgument` when `out` is not exactly one slice long.
    pub fn copy_to_f32(&self, out: &mut [f32]) -> Result<()> {
        if out.len() != self.len() {
            return Err(MicsliceError::InvalidArgument(format!(
                "output holds {} samples, slice has {}",
                out.len(),
                self.len()
            )));
        }
        for (dst, sample) in out.iter_mut().zip(self.slot.iter()) {
            *dst = sample as f32;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<i16> {
        self.slot.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(shared: &StreamShared, slices: usize) {
        for i in 0..slices * shared.slice_samples() {
            shared.push_sample(i as i16);
        }
    }

    #[test]
    fn zero_slice_is_rejected() {
        assert!(matches!(
            StreamShared::try_new(0),
            Err(MicsliceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn first_completion_flips_and_signals() {
        let shared = StreamShared::try_new(4).unwrap();
        fill(&shared, 1);
        assert!(shared.is_ready());
        assert_eq!(shared.active_index(), 1);
        assert_eq!(shared.slot(1).cursor(), 0);
        assert_eq!(shared.diagnostics.snapshot().overruns, 0);
    }

    #[test]
    fn unconsumed_slices_count_as_overruns() {
        for produced in 1..6 {
            let shared = StreamShared::try_new(8).unwrap();
            fill(&shared, produced);
            let snap = shared.diagnostics.snapshot();
            assert_eq!(snap.slices_completed, produced);
            assert_eq!(snap.overruns, produced - 1);
        }
    }

    #[test]
    fn completed_slot_keeps_its_samples() {
        let shared = StreamShared::try_new(3).unwrap();
        for s in [10, 20, 30, 40] {
            shared.push_sample(s);
        }
        // Slot 0 is complete, slot 1 holds one new sample.
        assert_eq!(shared.slot(0).iter().collect::<Vec<_>>(), vec![10, 20, 30]);
        assert_eq!(shared.slot(1).cursor(), 1);
        assert_eq!(shared.active_index(), 1);
    }
}
