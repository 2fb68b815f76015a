use thiserror::Error;

use crate::capture::CaptureMode;

/// All errors produced by micslice-core.
#[derive(Debug, Error)]
pub enum MicsliceError {
    #[error("could not allocate a buffer of {samples} samples")]
    AllocationFailure { samples: usize },

    #[error("audio peripheral error: {0}")]
    Peripheral(String),

    #[error("stream capture is already running")]
    AlreadyStreaming,

    #[error("bulk recording is already in progress")]
    AlreadyRecording,

    #[error("cannot start {requested} capture while {active} capture is active")]
    ModeConflict {
        requested: CaptureMode,
        active: CaptureMode,
    },

    #[error("recording was never started")]
    NeverStarted,

    #[error("capture is not running")]
    NotRunning,

    #[error("slice not ready: consumer fell behind the producer")]
    SliceNotReady,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("classifier expects {expected} samples per slice, got {actual}")]
    ClassifierInput { expected: usize, actual: usize },

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MicsliceError>;
