//! `ReplayPeripheral`: serves prerecorded audio through the peripheral contract.
//!
//! Used for offline dataset preparation (cropping an existing WAV file) and for
//! exercising the capture engines without hardware. Once the source is
//! exhausted every read stalls for a moment and returns zero samples, the same
//! shape as a microphone that stopped clocking data.

use std::path::Path;
use std::thread;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use super::{raw_from_unit, resample::RateConverter, AudioPeripheral, PeripheralConfig};
use crate::error::{MicsliceError, Result};

/// How long an exhausted source sleeps before reporting an empty read.
const EXHAUSTED_STALL: Duration = Duration::from_millis(1);

pub struct ReplayPeripheral {
    samples: Vec<i32>,
    position: usize,
    /// Sleep per read so chunks arrive at the rate a live device would deliver them.
    pace_rate: Option<u32>,
}

impl ReplayPeripheral {
    /// Serve raw microphone words exactly as given.
    pub fn from_raw(samples: Vec<i32>) -> Self {
        Self {
            samples,
            position: 0,
            pace_rate: None,
        }
    }

    /// Load a WAV file and convert it to raw words at `target_rate`.
    ///
    /// Multi-channel files are averaged down to mono.
    ///
    /// # Errors
    /// `MicsliceError::Wav` if the file cannot be decoded.
    pub fn from_wav(path: &Path, target_rate: u32) -> Result<Self> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        let converted = if spec.sample_rate == target_rate {
            mono
        } else {
            info!(
                from = spec.sample_rate,
                to = target_rate,
                "resampling replay source"
            );
            RateConverter::new(spec.sample_rate, target_rate, 1024)?.convert_all(&mono)
        };

        debug!(
            path = %path.display(),
            samples = converted.len(),
            "replay source loaded"
        );
        Ok(Self::from_raw(converted.into_iter().map(raw_from_unit).collect()))
    }

    /// Deliver chunks no faster than a live device at `sample_rate`.
    pub fn paced(mut self, sample_rate: u32) -> Self {
        self.pace_rate = (sample_rate > 0).then_some(sample_rate);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioPeripheral for ReplayPeripheral {
    fn configure(&mut self, config: &PeripheralConfig) -> Result<()> {
        if config.channels != 1 {
            return Err(MicsliceError::InvalidArgument(format!(
                "replay source is mono, {} channels requested",
                config.channels
            )));
        }
        if self.pace_rate.is_some() {
            self.pace_rate = Some(config.sample_rate);
        }
        Ok(())
    }

    fn read_chunk(&mut self, dest: &mut [i32]) -> Result<usize> {
        let n = dest.len().min(self.remaining());
        if n == 0 {
            thread::sleep(EXHAUSTED_STALL);
            return Ok(0);
        }

        dest[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;

        if let Some(rate) = self.pace_rate {
            thread::sleep(Duration::from_secs_f64(n as f64 / rate as f64));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scale_raw_sample;

    #[test]
    fn serves_chunks_then_reports_empty() {
        let mut replay = ReplayPeripheral::from_raw((1..=10).collect());
        let mut buf = [0i32; 4];
        assert_eq!(replay.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(replay.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(replay.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[9, 10]);
        assert_eq!(replay.read_chunk(&mut buf).unwrap(), 0);
    }

    #[test]
    fn wav_source_round_trips_through_raw_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 20_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0i16, 1000, -1000, i16::MAX] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let mut replay = ReplayPeripheral::from_wav(&path, 20_000).unwrap();
        assert_eq!(replay.len(), 4);
        let mut buf = [0i32; 4];
        replay.read_chunk(&mut buf).unwrap();
        let pcm: Vec<i16> = buf.iter().map(|&w| scale_raw_sample(w)).collect();
        assert_eq!(pcm[0], 0);
        assert!((pcm[1] - 1000).abs() <= 1);
        assert!((pcm[2] + 1000).abs() <= 1);
        assert!(pcm[3] >= i16::MAX - 1);
    }

    #[test]
    fn stereo_configuration_is_rejected() {
        let mut replay = ReplayPeripheral::from_raw(vec![]);
        let mut config = PeripheralConfig::mono(20_000);
        config.channels = 2;
        assert!(replay.configure(&config).is_err());
    }
}
