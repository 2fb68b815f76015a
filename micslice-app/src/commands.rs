//! Command implementations driving micslice-core.

use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use micslice_core::audio::list_input_devices;
use micslice_core::{
    AudioExporter, BulkRecording, CaptureConfig, ClassifierHandle, CpalPeripheral,
    EnergyClassifier, FileIndexStore, FileNaming, FsStorage, IndexStore, Microphone,
    MicsliceError, PeripheralHandle, ReplayPeripheral, SliceClassifier,
};
use tracing::{info, warn};

use crate::settings::AppSettings;

const DONE_POLL: Duration = Duration::from_millis(20);
const INDEX_FILE: &str = "index.bin";

/// Replay source when given, otherwise the live input device.
///
/// Also returns the replay length in samples.
fn open_peripheral(
    settings: &AppSettings,
    replay: Option<&Path>,
    paced: bool,
) -> Result<(PeripheralHandle, Option<usize>)> {
    match replay {
        Some(path) => {
            let mut source = ReplayPeripheral::from_wav(path, settings.sample_rate)
                .with_context(|| format!("loading {}", path.display()))?;
            if paced {
                source = source.paced(settings.sample_rate);
            }
            let len = source.len();
            Ok((PeripheralHandle::new(source), Some(len)))
        }
        None => Ok((
            PeripheralHandle::new(CpalPeripheral::new(settings.preferred_input_device.clone())),
            None,
        )),
    }
}

/// Run one bulk recording to completion.
fn record_to_completion(mic: &mut Microphone, hint: Option<Duration>) -> Result<u32> {
    mic.start_bulk(hint).context("starting recording")?;
    let started = Instant::now();
    while !mic.is_bulk_done() {
        thread::sleep(DONE_POLL);
    }
    let length_ms = mic.stop_bulk()?;
    info!(length_ms, wall_ms = started.elapsed().as_millis() as u64, "recording finished");
    Ok(length_ms)
}

/// Write a recording into the dataset under the next free index.
fn export_to_dataset(settings: &AppSettings, recording: &BulkRecording<'_>) -> Result<()> {
    if recording.export_len() == 0 {
        bail!("nothing was recorded");
    }
    let root = settings.output_dir();
    std::fs::create_dir_all(&root)
        .with_context(|| format!("creating dataset root {}", root.display()))?;

    let mut index = FileIndexStore::new(root.join(INDEX_FILE));
    let current = index.read_index()?;
    let naming = FileNaming::new(&settings.base_name, &settings.device_name, current);

    let exporter = AudioExporter::new(FsStorage::new(&root), settings.dataset_config())?;
    let report = exporter.export_recording(recording, &naming, &mut rand::thread_rng())?;
    index.commit(current)?;

    info!(root = %root.display(), index = current, crops = report.crops.len(), "dataset sample written");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Turn `--seconds` into a duration the recording buffer can hold.
fn recording_hint(seconds: Option<f32>, max: Duration) -> Result<Option<Duration>> {
    let Some(seconds) = seconds else {
        return Ok(None);
    };
    let hint = Duration::try_from_secs_f32(seconds)
        .with_context(|| format!("invalid recording length: {seconds} s"))?;
    if hint > max {
        bail!(
            "recording length {seconds} s exceeds the {:.1} s buffer",
            max.as_secs_f32()
        );
    }
    Ok(Some(hint))
}

pub fn record(settings: &AppSettings, seconds: Option<f32>, replay: Option<&Path>) -> Result<()> {
    let config = settings.capture_config();
    let hint = recording_hint(seconds, config.max_recording())?;

    let (peripheral, _) = open_peripheral(settings, replay, false)?;
    let mut mic = Microphone::new(config, peripheral).context("opening microphone")?;

    record_to_completion(&mut mic, hint)?;
    let recording = mic.recording()?;
    export_to_dataset(settings, &recording)
}

pub fn export(settings: &AppSettings, file: &Path) -> Result<()> {
    let source = ReplayPeripheral::from_wav(file, settings.sample_rate)
        .with_context(|| format!("loading {}", file.display()))?;
    if source.is_empty() {
        bail!("{} holds no audio", file.display());
    }
    let config = CaptureConfig {
        buffer_capacity: source.len(),
        ..settings.capture_config()
    };

    let mut mic = Microphone::new(config, PeripheralHandle::new(source))?;
    record_to_completion(&mut mic, None)?;
    let recording = mic.recording()?;
    export_to_dataset(settings, &recording)
}

pub fn listen(settings: &AppSettings, ticks: Option<u64>, replay: Option<&Path>) -> Result<()> {
    let (peripheral, replay_len) = open_peripheral(settings, replay, true)?;
    let mut mic = Microphone::new(settings.capture_config(), peripheral)
        .context("opening microphone")?;

    let consumer = mic.start_stream(settings.slice_samples)?;
    let model = ClassifierHandle::new(EnergyClassifier::new(
        settings.slice_samples,
        settings.classifier_threshold,
    ));
    let mut classifier = SliceClassifier::new(consumer, model, settings.smoothing)?;

    // A replayed file has a natural end.
    let limit = ticks.or(replay_len.map(|n| (n / settings.slice_samples) as u64));
    let mut out = io::stdout().lock();
    let mut emitted = 0u64;

    while limit.map_or(true, |l| emitted < l) {
        match classifier.tick() {
            Ok(event) => {
                writeln!(out, "{}", serde_json::to_string(&event)?)?;
                out.flush()?;
                emitted += 1;
            }
            Err(MicsliceError::SliceNotReady) => warn!("classifier fell behind; skipping stale slice"),
            Err(MicsliceError::NotRunning) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let diagnostics = classifier.consumer().diagnostics();
    mic.stop_stream();
    info!(
        ticks = emitted,
        slices = diagnostics.slices_completed,
        overruns = diagnostics.overruns,
        late_waits = diagnostics.late_waits,
        "listening stopped"
    );
    Ok(())
}

pub fn devices() -> Result<()> {
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("no input devices found");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{marker}", device.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(root: &Path) -> AppSettings {
        AppSettings {
            output_dir: Some(root.to_path_buf()),
            ..AppSettings::default()
        }
    }

    fn write_tone(path: &Path, samples: usize, rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample(((i % 200) as i16) * 50).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn export_command_writes_master_crops_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("take.wav");
        write_tone(&wav, 60_000, 20_000);
        let root = dir.path().join("dataset");
        let settings = settings_in(&root);

        export(&settings, &wav).unwrap();
        export(&settings, &wav).unwrap();

        assert!(root.join("master").join("sample.mic000001.wav").is_file());
        assert!(root.join("master").join("sample.mic000002.wav").is_file());
        let crops = std::fs::read_dir(root.join("crops")).unwrap().count();
        assert_eq!(crops, 16);
        assert_eq!(FileIndexStore::new(root.join(INDEX_FILE)).read_index().unwrap(), 3);
    }

    #[test]
    fn oversized_recording_length_is_an_error() {
        let max = Duration::from_secs(3);
        assert!(recording_hint(Some(1e30), max).is_err());
        assert!(recording_hint(Some(10.0), max).is_err());
        assert!(recording_hint(Some(f32::NAN), max).is_err());
        assert_eq!(recording_hint(None, max).unwrap(), None);
        assert_eq!(
            recording_hint(Some(1.5), max).unwrap(),
            Some(Duration::from_millis(1_500))
        );
    }

    #[test]
    fn record_rejects_huge_seconds_before_opening_a_device() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(&dir.path().join("dataset"));
        let missing = dir.path().join("missing.wav");
        let err = record(&settings, Some(1e30), Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("recording length"));
    }

    #[test]
    fn record_from_replay_is_limited_by_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("long.wav");
        write_tone(&wav, 60_000, 20_000);
        let root = dir.path().join("dataset");
        let settings = AppSettings {
            crop_count: 0,
            ..settings_in(&root)
        };

        record(&settings, Some(1.5), Some(&wav)).unwrap();

        let master = root.join("sample.mic000001.wav");
        let reader = hound::WavReader::open(&master).unwrap();
        assert_eq!(reader.len(), 30_000);
    }
}
