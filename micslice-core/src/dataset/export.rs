//! Writes a recording and its crops to storage.

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::crops::{CropPlan, CropSelector};
use super::naming::FileNaming;
use super::storage::Storage;
use super::wav::encode_wav;
use super::DatasetConfig;
use crate::capture::BulkRecording;
use crate::error::{MicsliceError, Result};

/// Files produced by one [`AudioExporter::export`] call, relative to the storage root.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub master: PathBuf,
    pub crops: Vec<PathBuf>,
    /// Crop offsets in samples; empty when the recording was too short.
    pub offsets: Vec<usize>,
    pub samples: usize,
}

pub struct AudioExporter<S: Storage> {
    storage: S,
    config: DatasetConfig,
    selector: CropSelector,
}

impl<S: Storage> AudioExporter<S> {
    /// # Errors
    /// `InvalidArgument` when the crop window or step is zero.
    pub fn new(storage: S, config: DatasetConfig) -> Result<Self> {
        let selector = config.selector()?;
        Ok(Self {
            storage,
            config,
            selector,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn export_recording<R: Rng + ?Sized>(
        &self,
        recording: &BulkRecording<'_>,
        naming: &FileNaming,
        rng: &mut R,
    ) -> Result<ExportReport> {
        if recording.export_len() < recording.samples_recorded {
            debug!(
                kept = recording.export_len(),
                captured = recording.samples_recorded,
                "trimming recording to settled length"
            );
        }
        self.export(recording.export_samples(), recording.sample_rate, naming, rng)
    }

    /// Write the full recording, then every planned crop.
    ///
    /// With `crop_count == 0` only the full recording is written, at the
    /// storage root. Otherwise it lands in the master directory and crops in
    /// the crops directory. A recording shorter than one window yields no
    /// crops.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty recording; storage and encoding errors
    /// as they occur.
    pub fn export<R: Rng + ?Sized>(
        &self,
        raw: &[i32],
        sample_rate: u32,
        naming: &FileNaming,
        rng: &mut R,
    ) -> Result<ExportReport> {
        if raw.is_empty() {
            return Err(MicsliceError::InvalidArgument(
                "recording holds no samples".into(),
            ));
        }
        let ext = self.config.extension.as_str();

        if self.config.crop_count == 0 {
            let master = PathBuf::from(naming.master_file(ext));
            self.write_file(&master, raw, sample_rate)?;
            info!(path = %master.display(), samples = raw.len(), "recording exported");
            return Ok(ExportReport {
                master,
                crops: Vec::new(),
                offsets: Vec::new(),
                samples: raw.len(),
            });
        }

        let master_dir = Path::new(&self.config.master_dir);
        let crops_dir = Path::new(&self.config.crops_dir);

        self.storage.ensure_dir(master_dir)?;
        let master = master_dir.join(naming.master_file(ext));
        self.write_file(&master, raw, sample_rate)?;

        self.storage.ensure_dir(crops_dir)?;
        let plan = self.selector.plan(raw.len(), self.config.crop_count, rng);
        if plan.is_empty() {
            warn!(
                samples = raw.len(),
                window = self.selector.window(),
                "recording shorter than one crop window; skipping crops"
            );
        } else if plan.len() < self.config.crop_count {
            debug!(requested = self.config.crop_count, planned = plan.len(), "fewer crops fit");
        }

        let crops = self.write_crops(crops_dir, raw, sample_rate, naming, &plan)?;
        info!(
            path = %master.display(),
            samples = raw.len(),
            crops = crops.len(),
            "recording exported"
        );
        Ok(ExportReport {
            master,
            crops,
            offsets: plan.offsets,
            samples: raw.len(),
        })
    }

    fn write_crops(
        &self,
        dir: &Path,
        raw: &[i32],
        sample_rate: u32,
        naming: &FileNaming,
        plan: &CropPlan,
    ) -> Result<Vec<PathBuf>> {
        let ext = self.config.extension.as_str();
        plan.offsets
            .iter()
            .map(|&offset| {
                let path = dir.join(naming.crop_file(offset, ext));
                self.write_window(&path, raw, offset, plan.window_samples, sample_rate)?;
                Ok(path)
            })
            .collect()
    }

    /// Write `raw[offset..offset + window]` as one file.
    ///
    /// # Errors
    /// `InvalidArgument` (nothing written) for a zero window or a range past
    /// the end of `raw`.
    pub fn write_window(
        &self,
        path: &Path,
        raw: &[i32],
        offset: usize,
        window: usize,
        sample_rate: u32,
    ) -> Result<()> {
        let in_range = offset
            .checked_add(window)
            .is_some_and(|end| end <= raw.len());
        if window == 0 || !in_range {
            return Err(MicsliceError::InvalidArgument(format!(
                "crop {offset}+{window} outside recording of {} samples",
                raw.len()
            )));
        }
        self.write_file(path, &raw[offset..offset + window], sample_rate)
    }

    fn write_file(&self, path: &Path, raw: &[i32], sample_rate: u32) -> Result<()> {
        let bytes = encode_wav(raw, sample_rate)?;
        if self.storage.exists(path) {
            self.storage.remove(path)?;
        }
        let mut out = self.storage.open_for_write(path)?;
        out.write_all(&bytes)?;
        out.flush()?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote wav");
        Ok(())
    }
}
