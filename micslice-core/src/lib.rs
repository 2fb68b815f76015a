//! # micslice-core
//!
//! Microphone capture and dataset preparation.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─► StreamCapture ─► [slot 0 | slot 1] ─► SliceConsumer ─► SliceClassifier
//! AudioPeripheral ─────┤        (micslice-stream)     ready flag       wait_for_slice      EMA top class
//!  (PeripheralHandle)  │
//!                      └─► BulkCapture ─► Vec<i32> ─► CropSelector ─► AudioExporter ─► Storage
//!                               (micslice-bulk)   done flag     offsets       WAV files
//! ```
//!
//! `Microphone` owns both capture paths and lets only one run at a time.
//! Slot memory is shared between producer and consumer through atomics, so
//! the consumer reads a finished slice in place without locking or copying.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod dataset;
pub mod error;
pub mod events;
pub mod inference;

// Convenience re-exports for downstream crates
pub use audio::{
    AudioPeripheral, CpalPeripheral, PeripheralConfig, PeripheralHandle, ReplayPeripheral,
};
pub use capture::{BulkRecording, CaptureConfig, CaptureMode, Microphone, SliceConsumer};
pub use dataset::{
    AudioExporter, CropPlan, CropSelector, DatasetConfig, ExportReport, FileIndexStore,
    FileNaming, FsStorage, IndexStore, Storage,
};
pub use error::{MicsliceError, Result};
pub use events::{CaptureStatus, CaptureStatusEvent, ClassificationEvent, TopClass};
pub use inference::{Classifier, ClassifierHandle, EnergyClassifier, SliceClassifier};
