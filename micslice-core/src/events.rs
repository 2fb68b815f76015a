//! Serializable event types.
//!
//! `CaptureStatusEvent` is broadcast by `Microphone` on every lifecycle
//! change; `ClassificationEvent` is produced once per classified slice. Both
//! serialize to camelCase JSON for log shipping or a UI bridge.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

/// Emitted when the microphone changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatusEvent {
    pub status: CaptureStatus,
    /// Optional human-readable detail (slice size, recorded length, …).
    pub detail: Option<String>,
}

/// Current state of the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// No producer owns the peripheral.
    Idle,
    /// Double-buffered streaming is feeding slices.
    Streaming,
    /// A bulk recording is filling the retained buffer.
    Recording,
}

// ---------------------------------------------------------------------------
// Classification events
// ---------------------------------------------------------------------------

/// Smoothed classifier output for one slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationEvent {
    /// Monotonically increasing tick number.
    pub seq: u64,
    /// Highest smoothed class, `None` only for a model without classes.
    pub top: Option<TopClass>,
    /// Smoothed score per class, in label order.
    pub scores: Vec<f32>,
    /// Slices lost to overruns since the stream started.
    pub overruns: usize,
}

/// The class with the highest smoothed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopClass {
    pub index: usize,
    pub label: String,
    pub score: f32,
}
