//! `Microphone`: lifecycle controller for the two capture modes.
//!
//! ## Lifecycle
//!
//! ```text
//! Microphone::new(config, peripheral)   → peripheral configured, status = Idle
//!     ├─► start_stream(n) → SliceConsumer, status = Streaming
//!     │       └─► stop_stream()          → status = Idle
//!     └─► start_bulk(hint)               → status = Recording
//!             └─► stop_bulk() → length   → status = Idle
//! ```
//!
//! Streaming and bulk capture share one peripheral, so starting either while
//! the other is active fails with `MicsliceError::ModeConflict`.

pub mod bulk;
pub mod stream;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

pub use bulk::{BulkCapture, BulkRecording, BulkSettings};
pub use stream::{Slice, SliceConsumer, StreamCapture, StreamSettings, StreamSnapshot};

use crate::{
    audio::{PeripheralConfig, PeripheralHandle},
    error::{MicsliceError, Result},
    events::{CaptureStatus, CaptureStatusEvent},
};

/// Broadcast channel capacity for status events.
const STATUS_CAP: usize = 64;

/// Configuration for `Microphone`.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture rate in Hz. Default: 20000.
    pub sample_rate: u32,
    /// Bulk recording buffer size in samples. Default: 60000 (3 s at 20 kHz).
    pub buffer_capacity: usize,
    /// Samples requested from the peripheral per read. Default: 1024.
    pub chunk_samples: usize,
    /// Delay before the streaming producer starts reading. Default: 50 ms.
    pub stream_warmup: Duration,
    /// Consumer poll interval while waiting for a slice. Default: 1 ms.
    pub slice_poll: Duration,
    /// Poll interval while `stop_bulk` waits for the producer. Default: 10 ms.
    pub stop_poll: Duration,
    /// Longest stall of a live peripheral a bulk recording waits through.
    /// Default: `None`, the read blocks until data arrives. Sources whose
    /// empty read means end of data (replayed files) end the recording at once.
    pub bulk_stall_limit: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 20_000,
            buffer_capacity: 60_000,
            chunk_samples: 1024,
            stream_warmup: Duration::from_millis(50),
            slice_poll: Duration::from_millis(1),
            stop_poll: Duration::from_millis(10),
            bulk_stall_limit: None,
        }
    }
}

impl CaptureConfig {
    /// Longest bulk recording the buffer can hold.
    pub fn max_recording(&self) -> Duration {
        Duration::from_millis(self.buffer_capacity as u64 * 1000 / self.sample_rate.max(1) as u64)
    }

    fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_samples: self.chunk_samples,
            warmup: self.stream_warmup,
            slice_poll: self.slice_poll,
        }
    }

    fn bulk_settings(&self) -> BulkSettings {
        BulkSettings {
            sample_rate: self.sample_rate,
            capacity: self.buffer_capacity,
            chunk_samples: self.chunk_samples,
            stop_poll: self.stop_poll,
            stall_limit: self.bulk_stall_limit,
        }
    }
}

/// Which producer currently owns the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Stream,
    Bulk,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Stream => f.write_str("stream"),
            CaptureMode::Bulk => f.write_str("bulk"),
        }
    }
}

/// The top-level capture handle.
pub struct Microphone {
    config: CaptureConfig,
    peripheral: PeripheralHandle,
    stream: StreamCapture,
    bulk: BulkCapture,
    status: CaptureStatus,
    status_tx: broadcast::Sender<CaptureStatusEvent>,
}

impl Microphone {
    /// Configure the peripheral for mono capture at `config.sample_rate`.
    ///
    /// # Errors
    /// Propagates the peripheral's `configure` error.
    pub fn new(config: CaptureConfig, peripheral: PeripheralHandle) -> Result<Self> {
        if config.sample_rate == 0 || config.buffer_capacity == 0 || config.chunk_samples == 0 {
            return Err(MicsliceError::InvalidArgument(
                "sample rate, buffer capacity and chunk size must be non-zero".into(),
            ));
        }
        peripheral
            .0
            .lock()
            .configure(&PeripheralConfig::mono(config.sample_rate))?;

        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        let bulk = BulkCapture::new(config.bulk_settings());
        info!(
            sample_rate = config.sample_rate,
            buffer_capacity = config.buffer_capacity,
            "microphone ready"
        );

        Ok(Self {
            config,
            peripheral,
            stream: StreamCapture::new(),
            bulk,
            status: CaptureStatus::Idle,
            status_tx,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Mode currently holding the peripheral, if any.
    pub fn active_mode(&self) -> Option<CaptureMode> {
        if self.stream.is_running() {
            Some(CaptureMode::Stream)
        } else if self.bulk.is_recording() {
            Some(CaptureMode::Bulk)
        } else {
            None
        }
    }

    /// Start double-buffered streaming with slices of `slice_samples`.
    ///
    /// # Errors
    /// - `MicsliceError::ModeConflict` while a bulk recording runs.
    /// - `MicsliceError::AlreadyStreaming` if streaming already.
    /// - `MicsliceError::AllocationFailure` if the slots cannot be allocated.
    pub fn start_stream(&mut self, slice_samples: usize) -> Result<SliceConsumer> {
        if self.bulk.is_recording() {
            return Err(MicsliceError::ModeConflict {
                requested: CaptureMode::Stream,
                active: CaptureMode::Bulk,
            });
        }
        let consumer = self.stream.start(
            self.peripheral.clone(),
            slice_samples,
            self.config.stream_settings(),
        )?;
        self.set_status(CaptureStatus::Streaming, Some(format!("{slice_samples} samples per slice")));
        Ok(consumer)
    }

    /// Stop streaming. No-op when not streaming.
    pub fn stop_stream(&mut self) {
        if !self.stream.is_running() {
            return;
        }
        self.stream.stop();
        self.set_status(CaptureStatus::Idle, None);
    }

    /// Start a single-shot recording into the retained buffer.
    ///
    /// # Errors
    /// - `MicsliceError::ModeConflict` while streaming.
    /// - `MicsliceError::AlreadyRecording` if a recording is in progress.
    /// - `MicsliceError::AllocationFailure` if the buffer cannot be allocated.
    pub fn start_bulk(&mut self, duration_hint: Option<Duration>) -> Result<()> {
        if self.stream.is_running() {
            return Err(MicsliceError::ModeConflict {
                requested: CaptureMode::Bulk,
                active: CaptureMode::Stream,
            });
        }
        self.bulk.start(self.peripheral.clone(), duration_hint)?;
        self.set_status(CaptureStatus::Recording, None);
        Ok(())
    }

    /// Settle the recording length and wait for the producer to finish.
    ///
    /// # Errors
    /// `MicsliceError::NeverStarted` if no recording was ever started.
    pub fn stop_bulk(&mut self) -> Result<u32> {
        let length_ms = self.bulk.stop()?;
        if self.status == CaptureStatus::Recording {
            self.set_status(CaptureStatus::Idle, Some(format!("recorded {length_ms} ms")));
        }
        Ok(length_ms)
    }

    pub fn is_bulk_done(&self) -> bool {
        self.bulk.is_done()
    }

    /// Borrow the last finished recording.
    ///
    /// # Errors
    /// See `BulkCapture::recording`.
    pub fn recording(&mut self) -> Result<BulkRecording<'_>> {
        self.bulk.recording()
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<CaptureStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn stream_diagnostics(&self) -> Option<StreamSnapshot> {
        self.stream.shared().map(|s| s.diagnostics.snapshot())
    }

    fn set_status(&mut self, status: CaptureStatus, detail: Option<String>) {
        self.status = status;
        let _ = self.status_tx.send(CaptureStatusEvent { status, detail });
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stream.stop();
    }
}
