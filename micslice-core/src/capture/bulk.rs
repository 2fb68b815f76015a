//! Single-shot recording into one large retained buffer.
//!
//! ## Length bookkeeping
//!
//! `length_ms` starts unset and is written exactly once, by whichever side
//! gets there first:
//! - `stop()` writes the elapsed wall time, clamped to the buffer duration.
//! - The producer, on finishing by itself, writes the captured duration.
//!
//! A recording is never cut short: `stop()` waits for the producer to fill
//! the buffer (or hit a peripheral failure) before returning.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    audio::PeripheralHandle,
    buffering::try_alloc_zeroed,
    error::{MicsliceError, Result},
};

const LENGTH_UNSET: u32 = u32::MAX;

/// Producer parameters copied from `CaptureConfig`.
#[derive(Debug, Clone, Copy)]
pub struct BulkSettings {
    pub sample_rate: u32,
    pub capacity: usize,
    pub chunk_samples: usize,
    pub stop_poll: Duration,
    /// How long a live peripheral may stall before the recording ends early.
    /// `None` waits for data indefinitely.
    pub stall_limit: Option<Duration>,
}

impl BulkSettings {
    fn samples_to_ms(&self, samples: usize) -> u32 {
        ((samples as u64 * 1000) / self.sample_rate.max(1) as u64).min(u32::MAX as u64 - 1) as u32
    }

    fn ms_to_samples(&self, ms: u64) -> usize {
        (ms.saturating_mul(self.sample_rate as u64) / 1000) as usize
    }
}

struct BulkShared {
    done: AtomicBool,
    samples_recorded: AtomicUsize,
    length_ms: AtomicU32,
}

impl BulkShared {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            samples_recorded: AtomicUsize::new(0),
            length_ms: AtomicU32::new(LENGTH_UNSET),
        }
    }

    /// First writer wins; later calls keep the stored value.
    fn settle_length(&self, ms: u32) -> u32 {
        match self
            .length_ms
            .compare_exchange(LENGTH_UNSET, ms, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => ms,
            Err(existing) => existing,
        }
    }
}

/// Owns the recording buffer and the bulk producer thread.
pub struct BulkCapture {
    settings: BulkSettings,
    shared: Arc<BulkShared>,
    /// Retained buffer while idle; moved into the producer while recording.
    buffer: Option<Vec<i32>>,
    handle: Option<JoinHandle<Vec<i32>>>,
    started_at: Option<Instant>,
    /// Samples requested for the current session.
    target: usize,
}

/// Read-only view of a finished recording.
#[derive(Debug, Clone, Copy)]
pub struct BulkRecording<'a> {
    /// Raw peripheral words, `samples_recorded` long.
    pub samples: &'a [i32],
    pub samples_recorded: usize,
    pub length_ms: u32,
    pub sample_rate: u32,
}

impl BulkRecording<'_> {
    /// Samples to export: the settled length, never more than was captured.
    pub fn export_len(&self) -> usize {
        let by_length = (self.length_ms as u64 * self.sample_rate as u64 / 1000) as usize;
        by_length.min(self.samples_recorded)
    }

    pub fn export_samples(&self) -> &[i32] {
        &self.samples[..self.export_len()]
    }
}

impl BulkCapture {
    pub fn new(settings: BulkSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(BulkShared::new()),
            buffer: None,
            handle: None,
            started_at: None,
            target: settings.capacity,
        }
    }

    /// `true` while a producer is filling the buffer.
    pub fn is_recording(&self) -> bool {
        self.producer_alive() && !self.shared.done.load(Ordering::Acquire)
    }

    /// Non-blocking: the producer finished, or its thread is gone.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
            || self.handle.as_ref().is_some_and(|h| h.is_finished())
    }

    fn producer_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Longest duration the current session can hold.
    pub fn max_length_ms(&self) -> u32 {
        self.settings.samples_to_ms(self.target)
    }

    /// Start filling the buffer from `peripheral`.
    ///
    /// `duration_hint` shortens the recording below the buffer capacity.
    ///
    /// # Errors
    /// - `MicsliceError::AlreadyRecording` while a producer is running.
    /// - `MicsliceError::AllocationFailure` if the buffer cannot be allocated.
    pub fn start(
        &mut self,
        peripheral: PeripheralHandle,
        duration_hint: Option<Duration>,
    ) -> Result<()> {
        if self.is_recording() {
            return Err(MicsliceError::AlreadyRecording);
        }
        self.reclaim();

        let capacity = self.settings.capacity;
        let mut buffer = match self.buffer.take() {
            Some(buf) if buf.len() == capacity => buf,
            _ => try_alloc_zeroed::<i32>(capacity)?,
        };
        let target = duration_hint
            .map(|d| self.settings.ms_to_samples(d.as_millis() as u64))
            .map_or(capacity, |n| n.clamp(1, capacity));

        let mut scratch = match try_alloc_zeroed::<i32>(self.settings.chunk_samples.max(1)) {
            Ok(s) => s,
            Err(e) => {
                self.buffer = Some(buffer);
                return Err(e);
            }
        };

        let shared = Arc::new(BulkShared::new());
        self.shared = Arc::clone(&shared);
        self.target = target;

        let ends_on_empty = {
            let mut device = peripheral.0.lock();
            device.discard_pending();
            device.ends_on_empty_read()
        };
        let started_at = Instant::now();
        let settings = self.settings;

        let handle = thread::Builder::new()
            .name("micslice-bulk".into())
            .spawn(move || {
                let on_empty = if ends_on_empty {
                    EmptyRead::EndsRecording
                } else {
                    EmptyRead::Stall(settings.stall_limit)
                };
                let recorded =
                    fill_buffer(&peripheral, &mut buffer[..target], &mut scratch, on_empty);
                let natural = settings.samples_to_ms(recorded);
                let length = shared.settle_length(natural);
                shared.samples_recorded.store(recorded, Ordering::Release);
                shared.done.store(true, Ordering::Release);
                debug!(recorded, length_ms = length, "bulk producer finished");
                buffer
            })?;

        self.started_at = Some(started_at);
        self.handle = Some(handle);
        info!(target_samples = target, "bulk recording started");
        Ok(())
    }

    /// Settle the recording length and wait for the producer to finish.
    ///
    /// Calling it again returns the same length.
    ///
    /// # Errors
    /// `MicsliceError::NeverStarted` if `start` was never called.
    pub fn stop(&mut self) -> Result<u32> {
        let started_at = self.started_at.ok_or(MicsliceError::NeverStarted)?;

        let elapsed = started_at.elapsed().as_millis().min(u32::MAX as u128) as u32;
        let clamped = elapsed.min(self.max_length_ms());
        let length = self.shared.settle_length(clamped);

        if self.handle.is_some() {
            // A panicked producer never sets `done`; its finished thread ends the wait.
            while !self.shared.done.load(Ordering::Acquire) && self.producer_alive() {
                thread::sleep(self.settings.stop_poll);
            }
            self.reclaim();
        }

        Ok(length)
    }

    /// Borrow the finished recording, joining the producer if it just ended.
    ///
    /// # Errors
    /// - `MicsliceError::NeverStarted` before the first `start`.
    /// - `MicsliceError::AlreadyRecording` while the producer is still running.
    pub fn recording(&mut self) -> Result<BulkRecording<'_>> {
        if self.started_at.is_none() {
            return Err(MicsliceError::NeverStarted);
        }
        if self.is_recording() {
            return Err(MicsliceError::AlreadyRecording);
        }
        self.reclaim();

        let samples_recorded = self.shared.samples_recorded.load(Ordering::Acquire);
        let length_ms = self.shared.length_ms.load(Ordering::Acquire);
        let buffer = self.buffer.as_deref().unwrap_or(&[]);
        let samples_recorded = samples_recorded.min(buffer.len());

        Ok(BulkRecording {
            samples: &buffer[..samples_recorded],
            samples_recorded,
            length_ms: if length_ms == LENGTH_UNSET { 0 } else { length_ms },
            sample_rate: self.settings.sample_rate,
        })
    }

    /// Take the buffer back from a finished producer thread.
    fn reclaim(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match handle.join() {
            Ok(buffer) => self.buffer = Some(buffer),
            Err(_) => {
                warn!("bulk producer panicked; recording buffer lost");
                self.shared.done.store(true, Ordering::Release);
            }
        }
    }
}

/// What an `Ok(0)` read means to the bulk producer.
#[derive(Debug, Clone, Copy)]
enum EmptyRead {
    /// The source is finished.
    EndsRecording,
    /// A live device stalled; keep reading, up to the limit if one is set.
    Stall(Option<Duration>),
}

/// Read chunks straight into `dest` until it is full or the peripheral fails.
///
/// Returns the number of samples captured.
fn fill_buffer(
    peripheral: &PeripheralHandle,
    dest: &mut [i32],
    scratch: &mut [i32],
    on_empty: EmptyRead,
) -> usize {
    let mut recorded = 0;
    let mut stalled_since: Option<Instant> = None;

    while recorded < dest.len() {
        let want = (dest.len() - recorded).min(scratch.len());
        let read = peripheral.0.lock().read_chunk(&mut scratch[..want]);

        let n = match read {
            Ok(0) => match on_empty {
                EmptyRead::EndsRecording => {
                    warn!(recorded, "peripheral returned no data; ending recording early");
                    break;
                }
                EmptyRead::Stall(limit) => {
                    let since = *stalled_since.get_or_insert_with(|| {
                        debug!(recorded, "peripheral stalled; waiting for data");
                        Instant::now()
                    });
                    if limit.is_some_and(|l| since.elapsed() >= l) {
                        warn!(recorded, "peripheral stalled too long; ending recording early");
                        break;
                    }
                    continue;
                }
            },
            Ok(n) => n.min(want),
            Err(e) => {
                warn!(recorded, "peripheral read failed: {e}; ending recording early");
                break;
            }
        };

        stalled_since = None;
        dest[recorded..recorded + n].copy_from_slice(&scratch[..n]);
        recorded += n;
    }

    recorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::audio::{AudioPeripheral, PeripheralConfig, ReplayPeripheral};

    /// Live-style source: each entry is one read's sample count, 0 a stall.
    struct LiveScript {
        reads: VecDeque<usize>,
    }

    impl AudioPeripheral for LiveScript {
        fn configure(&mut self, _config: &PeripheralConfig) -> Result<()> {
            Ok(())
        }

        fn read_chunk(&mut self, dest: &mut [i32]) -> Result<usize> {
            let n = self.reads.pop_front().unwrap_or(0).min(dest.len());
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            dest[..n].fill(7);
            Ok(n)
        }

        fn ends_on_empty_read(&self) -> bool {
            false
        }
    }

    struct FaultyDriver;

    impl AudioPeripheral for FaultyDriver {
        fn configure(&mut self, _config: &PeripheralConfig) -> Result<()> {
            Ok(())
        }

        fn read_chunk(&mut self, _dest: &mut [i32]) -> Result<usize> {
            panic!("driver fault");
        }
    }

    fn live(reads: &[usize]) -> PeripheralHandle {
        PeripheralHandle::new(LiveScript {
            reads: reads.iter().copied().collect(),
        })
    }

    fn wait_done(bulk: &BulkCapture) {
        let start = Instant::now();
        while !bulk.is_done() {
            assert!(start.elapsed() < Duration::from_secs(3), "producer never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn settings(capacity: usize) -> BulkSettings {
        BulkSettings {
            sample_rate: 1_000,
            capacity,
            chunk_samples: 64,
            stop_poll: Duration::from_millis(1),
            stall_limit: None,
        }
    }

    fn replay(samples: usize) -> PeripheralHandle {
        PeripheralHandle::new(ReplayPeripheral::from_raw((0..samples as i32).collect()))
    }

    #[test]
    fn stop_before_start_reports_never_started() {
        let mut bulk = BulkCapture::new(settings(100));
        assert!(matches!(bulk.stop(), Err(MicsliceError::NeverStarted)));
        assert!(matches!(bulk.recording(), Err(MicsliceError::NeverStarted)));
    }

    #[test]
    fn natural_completion_fills_the_buffer() {
        let mut bulk = BulkCapture::new(settings(500));
        bulk.start(replay(1_000), None).unwrap();
        while !bulk.is_done() {
            thread::sleep(Duration::from_millis(1));
        }
        let rec = bulk.recording().unwrap();
        assert_eq!(rec.samples_recorded, 500);
        assert_eq!(rec.length_ms, 500);
        assert_eq!(rec.samples[499], 499);
        assert_eq!(rec.export_len(), 500);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut bulk = BulkCapture::new(settings(300));
        bulk.start(replay(1_000), None).unwrap();
        let first = bulk.stop().unwrap();
        let second = bulk.stop().unwrap();
        assert_eq!(first, second);
        assert!(first <= 300);
    }

    #[test]
    fn exhausted_peripheral_keeps_partial_data() {
        let mut bulk = BulkCapture::new(settings(1_000));
        bulk.start(replay(250), None).unwrap();
        while !bulk.is_done() {
            thread::sleep(Duration::from_millis(1));
        }
        let rec = bulk.recording().unwrap();
        assert_eq!(rec.samples_recorded, 250);
        assert_eq!(rec.length_ms, 250);
        assert_eq!(rec.export_samples().len(), 250);
    }

    #[test]
    fn duration_hint_limits_samples() {
        let mut bulk = BulkCapture::new(settings(1_000));
        bulk.start(replay(2_000), Some(Duration::from_millis(120)))
            .unwrap();
        assert_eq!(bulk.max_length_ms(), 120);
        while !bulk.is_done() {
            thread::sleep(Duration::from_millis(1));
        }
        let rec = bulk.recording().unwrap();
        assert_eq!(rec.samples_recorded, 120);
    }

    #[test]
    fn export_len_follows_the_settled_length() {
        let samples = vec![0i32; 1_000];
        let rec = BulkRecording {
            samples: &samples,
            samples_recorded: 1_000,
            length_ms: 400,
            sample_rate: 1_000,
        };
        assert_eq!(rec.export_len(), 400);
    }

    #[test]
    fn buffer_is_reused_across_sessions() {
        let mut bulk = BulkCapture::new(settings(200));
        bulk.start(replay(1_000), None).unwrap();
        bulk.stop().unwrap();
        bulk.start(replay(50), None).unwrap();
        bulk.stop().unwrap();
        let rec = bulk.recording().unwrap();
        assert_eq!(rec.samples_recorded, 50);
    }

    #[test]
    fn live_stalls_do_not_truncate_the_recording() {
        let mut bulk = BulkCapture::new(settings(200));
        bulk.start(live(&[0, 0, 0, 64, 0, 0, 64, 0, 64, 8]), None).unwrap();
        wait_done(&bulk);
        let rec = bulk.recording().unwrap();
        assert_eq!(rec.samples_recorded, 200);
        assert!(rec.samples.iter().all(|&s| s == 7));
    }

    #[test]
    fn stall_limit_ends_a_live_recording() {
        let mut config = settings(200);
        config.stall_limit = Some(Duration::from_millis(20));
        let mut bulk = BulkCapture::new(config);
        bulk.start(live(&[50]), None).unwrap();
        wait_done(&bulk);
        assert_eq!(bulk.recording().unwrap().samples_recorded, 50);
    }

    #[test]
    fn panicked_producer_does_not_hang_stop() {
        let mut bulk = BulkCapture::new(settings(100));
        bulk.start(PeripheralHandle::new(FaultyDriver), None).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let stopped = bulk.stop().map(|_| ());
            let _ = tx.send((stopped, bulk));
        });
        let (stopped, mut bulk) = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("stop returned after the producer panicked");

        assert!(stopped.is_ok());
        assert!(!bulk.is_recording());
        assert!(bulk.is_done());
        assert_eq!(bulk.recording().unwrap().samples_recorded, 0);

        // The capture is usable again.
        bulk.start(replay(500), None).unwrap();
        wait_done(&bulk);
        assert_eq!(bulk.recording().unwrap().samples_recorded, 100);
    }
}
