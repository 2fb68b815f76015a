//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use micslice_core::{CaptureConfig, DatasetConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub sample_rate: u32,
    pub buffer_seconds: f32,
    /// Dataset root; `None` means `<data dir>/recordings`.
    pub output_dir: Option<PathBuf>,
    pub base_name: String,
    pub device_name: String,
    pub crop_count: usize,
    pub crop_window_samples: usize,
    pub crop_step_samples: usize,
    pub slice_samples: usize,
    pub classifier_threshold: f32,
    pub smoothing: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            sample_rate: 20_000,
            buffer_seconds: 3.0,
            output_dir: None,
            base_name: "sample".into(),
            device_name: "mic".into(),
            crop_count: 8,
            crop_window_samples: 20_000,
            crop_step_samples: 2_000,
            slice_samples: 20_000,
            classifier_threshold: 1_000.0,
            smoothing: 0.8,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.sample_rate = self.sample_rate.clamp(8_000, 96_000);
        self.buffer_seconds = if self.buffer_seconds.is_finite() {
            self.buffer_seconds.clamp(0.5, 60.0)
        } else {
            3.0
        };
        self.base_name = normalize_name_part(&self.base_name, "sample");
        self.device_name = normalize_name_part(&self.device_name, "mic");
        self.crop_count = self.crop_count.min(64);
        self.crop_window_samples = self.crop_window_samples.clamp(256, 10 * self.sample_rate as usize);
        self.crop_step_samples = self.crop_step_samples.clamp(1, self.crop_window_samples);
        self.slice_samples = self.slice_samples.clamp(256, 10 * self.sample_rate as usize);
        self.classifier_threshold = if self.classifier_threshold.is_finite() {
            self.classifier_threshold.clamp(1.0, 32_767.0)
        } else {
            1_000.0
        };
        self.smoothing = if self.smoothing.is_finite() {
            self.smoothing.clamp(0.01, 0.99)
        } else {
            0.8
        };
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.output_dir = self
            .output_dir
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            buffer_capacity: (self.buffer_seconds * self.sample_rate as f32) as usize,
            ..CaptureConfig::default()
        }
    }

    pub fn dataset_config(&self) -> DatasetConfig {
        DatasetConfig {
            window_samples: self.crop_window_samples,
            crop_step: self.crop_step_samples,
            crop_count: self.crop_count,
            ..DatasetConfig::default()
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join("recordings"))
    }
}

/// File names carry these parts verbatim, so keep them to safe characters.
fn normalize_name_part(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();
    if cleaned.is_empty() {
        fallback.into()
    } else {
        cleaned
    }
}

pub fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("micslice")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("micslice")
    }
}

pub fn default_settings_path() -> PathBuf {
    app_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
