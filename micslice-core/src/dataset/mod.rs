//! Dataset preparation: crop planning, WAV encoding, file naming, storage.
//!
//! A finished bulk recording becomes one "master" WAV plus up to
//! `crop_count` fixed-length crops:
//!
//! ```text
//! <root>/master/<base>.<device>000042.wav
//! <root>/crops/<base>.<device>000042_00000.wav
//! <root>/crops/<base>.<device>000042_06000.wav
//! ...
//! ```

pub mod crops;
pub mod export;
pub mod index;
pub mod naming;
pub mod storage;
pub mod wav;

pub use crops::{plan_crops, CropPlan, CropSelector};
pub use export::{AudioExporter, ExportReport};
pub use index::{next_index, FileIndexStore, IndexStore};
pub use naming::FileNaming;
pub use storage::{FsStorage, Storage};
pub use wav::{encode_wav, WAV_HEADER_LEN};

use serde::{Deserialize, Serialize};

/// Crop geometry and on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetConfig {
    /// Samples per crop. Default: 20000 (one second at 20 kHz).
    pub window_samples: usize,
    /// Grid spacing of candidate crop starts. Default: 2000.
    pub crop_step: usize,
    /// Crops requested per recording; 0 exports only the full recording.
    pub crop_count: usize,
    pub master_dir: String,
    pub crops_dir: String,
    pub extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            window_samples: 20_000,
            crop_step: 2_000,
            crop_count: 8,
            master_dir: "master".into(),
            crops_dir: "crops".into(),
            extension: "wav".into(),
        }
    }
}

impl DatasetConfig {
    /// # Errors
    /// `MicsliceError::InvalidArgument` for a zero window or zero step.
    pub fn selector(&self) -> crate::error::Result<CropSelector> {
        CropSelector::new(self.window_samples, self.crop_step)
    }
}
