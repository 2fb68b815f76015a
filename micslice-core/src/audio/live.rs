//! Live microphone backend built on cpal.
//!
//! # Threading
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS), while an `AudioPeripheral` has to move into the producer thread.
//! `CpalPeripheral` therefore opens the stream on a dedicated keeper thread
//! that owns it until the peripheral is dropped. The open result (or error)
//! travels back over a one-shot crossbeam channel.
//!
//! # Callback contract
//!
//! The input callback runs on an OS audio thread. It down-mixes to mono into a
//! scratch buffer sized on first use and pushes into the SPSC ring with the
//! lock-free `push_slice`. No locks, no I/O.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{raw_from_unit, resample::RateConverter, AudioPeripheral, PeripheralConfig};
use crate::buffering::{create_frame_ring, Consumer, FrameConsumer};
use crate::error::{MicsliceError, Result};

/// Frames drained from the ring per pass.
const DRAIN_FRAMES: usize = 1024;
/// Sleep while the ring is empty.
const EMPTY_RING_SLEEP: Duration = Duration::from_millis(2);
/// A read that sees no data for this long reports an empty chunk so the
/// stream producer can observe a stop request. Bulk recording retries it.
const STALL_LIMIT: Duration = Duration::from_millis(250);

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Microphone peripheral backed by the host's default audio API.
pub struct CpalPeripheral {
    preferred_device: Option<String>,
    consumer: Option<FrameConsumer>,
    converter: Option<RateConverter>,
    /// Converted samples not yet handed to a reader.
    pending: Vec<f32>,
    drain: Vec<f32>,
    /// Cleared on drop; the callback and the keeper thread both watch it.
    running: Arc<AtomicBool>,
    keeper: Option<JoinHandle<()>>,
}

impl CpalPeripheral {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self {
            preferred_device,
            consumer: None,
            converter: None,
            pending: Vec::new(),
            drain: vec![0f32; DRAIN_FRAMES],
            running: Arc::new(AtomicBool::new(false)),
            keeper: None,
        }
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(keeper) = self.keeper.take() {
            if keeper.join().is_err() {
                warn!("audio keeper thread panicked");
            }
        }
        self.consumer = None;
    }

    /// Pull everything currently in the ring through the rate converter.
    fn drain_ring(&mut self) -> usize {
        let (Some(consumer), Some(converter)) = (self.consumer.as_mut(), self.converter.as_mut())
        else {
            return 0;
        };
        let mut total = 0;
        loop {
            let n = consumer.pop_slice(&mut self.drain);
            if n == 0 {
                break;
            }
            total += n;
            self.pending.extend(converter.process(&self.drain[..n]));
        }
        total
    }
}

impl Drop for CpalPeripheral {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AudioPeripheral for CpalPeripheral {
    fn configure(&mut self, config: &PeripheralConfig) -> Result<()> {
        if config.channels != 1 {
            return Err(MicsliceError::InvalidArgument(format!(
                "only mono capture is supported, {} channels requested",
                config.channels
            )));
        }
        self.shutdown();

        let (producer, consumer) = create_frame_ring();
        let running = Arc::new(AtomicBool::new(true));
        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<u32>>(1);

        let keeper_running = Arc::clone(&running);
        let preferred = self.preferred_device.clone();
        let keeper = thread::Builder::new()
            .name("micslice-cpal".into())
            .spawn(move || {
                let stream = match open_stream(producer, Arc::clone(&keeper_running), preferred.as_deref()) {
                    Ok((stream, rate)) => {
                        let _ = open_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                while keeper_running.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(20));
                }
                // Stream drops here, on the thread that created it.
                drop(stream);
            })?;

        let device_rate = match open_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = keeper.join();
                return Err(e);
            }
            Err(_) => {
                let _ = keeper.join();
                return Err(MicsliceError::Peripheral(
                    "audio keeper thread died before opening the device".into(),
                ));
            }
        };

        self.converter = Some(RateConverter::new(device_rate, config.sample_rate, DRAIN_FRAMES)?);
        self.consumer = Some(consumer);
        self.pending.clear();
        self.running = running;
        self.keeper = Some(keeper);
        info!(device_rate, target_rate = config.sample_rate, "microphone configured");
        Ok(())
    }

    fn read_chunk(&mut self, dest: &mut [i32]) -> Result<usize> {
        if self.consumer.is_none() {
            return Err(MicsliceError::Peripheral("microphone not configured".into()));
        }

        let started = Instant::now();
        while self.pending.is_empty() {
            if !self.running.load(Ordering::Acquire) {
                return Err(MicsliceError::Peripheral("audio stream closed".into()));
            }
            if self.drain_ring() == 0 {
                if started.elapsed() >= STALL_LIMIT {
                    return Ok(0);
                }
                thread::sleep(EMPTY_RING_SLEEP);
            }
        }

        let n = dest.len().min(self.pending.len());
        for (dst, sample) in dest.iter_mut().zip(self.pending.drain(..n)) {
            *dst = raw_from_unit(sample);
        }
        Ok(n)
    }

    fn ends_on_empty_read(&self) -> bool {
        false
    }

    fn discard_pending(&mut self) {
        self.drain_ring();
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!(dropped, "discarded queued microphone samples");
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn open_stream(
    producer: crate::buffering::FrameProducer,
    running: Arc<AtomicBool>,
    preferred_device_name: Option<&str>,
) -> Result<(cpal::Stream, u32)> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SampleRate, StreamConfig};

    let host = cpal::default_host();

    let preferred = preferred_device_name.and_then(|wanted| {
        let found = host
            .input_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        if found.is_none() {
            warn!("preferred input device '{wanted}' not found, using default");
        }
        found
    });

    let device = match preferred.or_else(|| host.default_input_device()) {
        Some(device) => device,
        None => host
            .input_devices()
            .map_err(|e| MicsliceError::Peripheral(e.to_string()))?
            .next()
            .ok_or_else(|| MicsliceError::Peripheral("no input device found".into()))?,
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening input device"
    );

    let supported = device
        .default_input_config()
        .map_err(|e| MicsliceError::Peripheral(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, producer, running),
        SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, producer, running),
        SampleFormat::I32 => build_mono_stream::<i32>(&device, &config, producer, running),
        SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, running),
        fmt => {
            return Err(MicsliceError::Peripheral(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| MicsliceError::Peripheral(e.to_string()))?;

    Ok((stream, sample_rate))
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: crate::buffering::FrameProducer,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    use crate::buffering::Producer;
    use cpal::traits::DeviceTrait;
    use cpal::Sample;

    let ch = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / ch;
                mono.resize(frames, 0.0);
                for (f, out) in mono.iter_mut().enumerate() {
                    let frame = &data[f * ch..(f + 1) * ch];
                    *out = frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / ch as f32;
                }
                let written = producer.push_slice(&mono);
                if written < mono.len() {
                    warn!("frame ring full: dropped {} frames", mono.len() - written);
                }
            },
            |err| tracing::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| MicsliceError::Peripheral(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
fn open_stream(
    _producer: crate::buffering::FrameProducer,
    _running: Arc<AtomicBool>,
    _preferred_device_name: Option<&str>,
) -> Result<((), u32)> {
    Err(MicsliceError::Peripheral(
        "compiled without audio-cpal feature".into(),
    ))
}

/// List all available audio input devices, default first.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut list = match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            warn!("failed to enumerate input devices: {e}");
            default_name
                .map(|name| DeviceInfo {
                    name,
                    is_default: true,
                })
                .into_iter()
                .collect()
        }
    };
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}
