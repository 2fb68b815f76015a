use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use micslice_core::audio::RAW_SCALE_DIVISOR;
use micslice_core::dataset::WAV_HEADER_LEN;
use micslice_core::{
    AudioExporter, CaptureConfig, DatasetConfig, FileIndexStore, FileNaming, FsStorage,
    IndexStore, Microphone, PeripheralHandle, ReplayPeripheral,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Raw words whose 16-bit value is the sample position modulo 1000.
fn ramp(len: usize) -> Vec<i32> {
    (0..len).map(|i| (i % 1000) as i32 * RAW_SCALE_DIVISOR).collect()
}

fn record(raw: Vec<i32>) -> Microphone {
    let replay = PeripheralHandle::new(ReplayPeripheral::from_raw(raw));
    let mut mic = Microphone::new(CaptureConfig::default(), replay).unwrap();
    mic.start_bulk(None).unwrap();

    let start = Instant::now();
    while !mic.is_bulk_done() {
        assert!(start.elapsed() < Duration::from_secs(5), "recording never finished");
        thread::sleep(Duration::from_millis(2));
    }
    mic.stop_bulk().unwrap();
    mic
}

fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn full_buffer_exports_master_and_eight_crops() {
    let root = tempfile::tempdir().unwrap();
    let mut mic = record(ramp(60_000));
    let recording = mic.recording().unwrap();
    assert_eq!(recording.samples_recorded, 60_000);
    assert_eq!(recording.length_ms, 3_000);

    let exporter = AudioExporter::new(FsStorage::new(root.path()), DatasetConfig::default()).unwrap();
    let naming = FileNaming::new("clap", "board", 12);
    let mut rng = StdRng::seed_from_u64(2024);
    let report = exporter
        .export_recording(&recording, &naming, &mut rng)
        .unwrap();

    assert_eq!(report.master, Path::new("master").join("clap.board000012.wav"));
    let (spec, master) = read_wav(&root.path().join(&report.master));
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 20_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(master.len(), 60_000);
    assert_eq!(master[1_234], 234);

    assert_eq!(report.offsets.len(), 8);
    assert_eq!(report.crops.len(), 8);
    for pair in report.offsets.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    let expected_names: Vec<String> = report
        .offsets
        .iter()
        .map(|&offset| naming.crop_file(offset, "wav"))
        .collect();
    let mut expected_sorted = expected_names.clone();
    expected_sorted.sort();
    assert_eq!(sorted_names(&root.path().join("crops")), expected_sorted);

    for (path, &offset) in report.crops.iter().zip(&report.offsets) {
        assert_eq!(offset % 2_000, 0);
        assert!(offset + 20_000 <= 60_000);

        let full = root.path().join(path);
        let size = std::fs::metadata(&full).unwrap().len() as usize;
        assert_eq!(size, WAV_HEADER_LEN + 20_000 * 2);

        let (_, crop) = read_wav(&full);
        assert_eq!(crop.len(), 20_000);
        assert_eq!(crop[0], (offset % 1000) as i16);
        assert_eq!(crop[19_999], ((offset + 19_999) % 1000) as i16);
    }
}

#[test]
fn short_recording_exports_master_only() {
    let root = tempfile::tempdir().unwrap();
    let mut mic = record(ramp(15_000));
    let recording = mic.recording().unwrap();
    assert_eq!(recording.samples_recorded, 15_000);
    assert_eq!(recording.export_len(), 15_000);

    let exporter = AudioExporter::new(FsStorage::new(root.path()), DatasetConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let report = exporter
        .export_recording(&recording, &FileNaming::new("clap", "board", 1), &mut rng)
        .unwrap();

    assert!(report.offsets.is_empty());
    assert!(report.crops.is_empty());
    let (_, master) = read_wav(&root.path().join(&report.master));
    assert_eq!(master.len(), 15_000);
    assert!(root.path().join("crops").is_dir());
    assert!(sorted_names(&root.path().join("crops")).is_empty());
}

#[test]
fn index_numbers_consecutive_recordings() {
    let root = tempfile::tempdir().unwrap();
    let mut index = FileIndexStore::new(root.path().join("index.bin"));
    let config = DatasetConfig {
        crop_count: 0,
        ..DatasetConfig::default()
    };
    let exporter = AudioExporter::new(FsStorage::new(root.path()), config).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..3 {
        let naming = FileNaming::new("knock", "mic", index.advance().unwrap());
        exporter.export(&ramp(500), 20_000, &naming, &mut rng).unwrap();
    }

    let names: Vec<String> = sorted_names(root.path())
        .into_iter()
        .filter(|n| n.ends_with(".wav"))
        .collect();
    assert_eq!(
        names,
        vec![
            "knock.mic000001.wav",
            "knock.mic000002.wav",
            "knock.mic000003.wav",
        ]
    );
    assert_eq!(index.read_index().unwrap(), 4);
}
