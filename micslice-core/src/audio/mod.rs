//! Audio peripheral abstraction.
//!
//! # Design constraints
//!
//! The microphone is a single exclusive resource. Exactly one producer thread
//! (streaming or bulk) reads from it at a time, through a `PeripheralHandle`.
//! `read_chunk` is the only hardware-driven wait in the system: it blocks until
//! the device hands over data and has no timeout.
//!
//! # Sample representation
//!
//! Peripherals deliver raw 32-bit microphone words. The useful signal sits in
//! the upper bits, so every consumer scales with [`scale_raw_sample`] (divide
//! by 4096, saturate to `i16`) before storing or writing samples.

pub mod live;
pub mod replay;
pub mod resample;

pub use live::{list_input_devices, CpalPeripheral, DeviceInfo};
pub use replay::ReplayPeripheral;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Divisor applied to raw microphone words before saturating to 16 bits.
pub const RAW_SCALE_DIVISOR: i32 = 4096;

/// Static peripheral configuration: mono, fixed rate, 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Capture rate in Hz.
    pub sample_rate: u32,
    /// Width of one raw word as delivered by the bus.
    pub bits_per_sample: u16,
    /// Always 1; the pipeline has no multi-channel path.
    pub channels: u16,
}

impl PeripheralConfig {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 32,
            channels: 1,
        }
    }
}

/// Contract for microphone backends.
pub trait AudioPeripheral: Send + 'static {
    /// Apply rate and format. Called once before the first capture session.
    ///
    /// # Errors
    /// Returns `MicsliceError::Peripheral` when the device cannot be opened.
    fn configure(&mut self, config: &PeripheralConfig) -> Result<()>;

    /// Blocking read of up to `dest.len()` raw words.
    ///
    /// Returns the number of words written. `Ok(0)` means the device produced
    /// nothing (stalled bus, exhausted source).
    fn read_chunk(&mut self, dest: &mut [i32]) -> Result<usize>;

    /// Drop anything the device queued before now, so a session starts fresh.
    fn discard_pending(&mut self) {}

    /// Whether `Ok(0)` from `read_chunk` means the source has nothing more to
    /// give (a replayed file ran out, a bus stopped clocking).
    ///
    /// Live devices return `false`: their empty reads are stalls bounded only
    /// so a streaming producer can notice a stop request, and a bulk
    /// recording keeps waiting through them.
    fn ends_on_empty_read(&self) -> bool {
        true
    }
}

/// Thread-safe reference-counted handle to any `AudioPeripheral` implementor.
///
/// The producer thread holds the lock for the duration of one `read_chunk`;
/// nothing else contends for it while a capture session is active.
#[derive(Clone)]
pub struct PeripheralHandle(pub Arc<Mutex<dyn AudioPeripheral>>);

impl PeripheralHandle {
    pub fn new<P: AudioPeripheral>(peripheral: P) -> Self {
        Self(Arc::new(Mutex::new(peripheral)))
    }
}

impl std::fmt::Debug for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralHandle").finish_non_exhaustive()
    }
}

/// Scale a raw microphone word to a 16-bit sample.
///
/// Division truncates toward zero; results outside the `i16` range saturate
/// at `i16::MIN` / `i16::MAX` instead of wrapping.
#[inline]
pub fn scale_raw_sample(raw: i32) -> i16 {
    (raw / RAW_SCALE_DIVISOR).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Map a float sample in `[-1.0, 1.0]` to a raw word that
/// [`scale_raw_sample`] turns back into the matching 16-bit value.
#[inline]
pub fn raw_from_unit(sample: f32) -> i32 {
    let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i32;
    pcm * RAW_SCALE_DIVISOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_truncates_toward_zero() {
        assert_eq!(scale_raw_sample(4095), 0);
        assert_eq!(scale_raw_sample(-4095), 0);
        assert_eq!(scale_raw_sample(8192), 2);
        assert_eq!(scale_raw_sample(-8193), -2);
    }

    #[test]
    fn scaling_saturates_at_i16_bounds() {
        assert_eq!(scale_raw_sample(i32::MAX), i16::MAX);
        assert_eq!(scale_raw_sample(i32::MIN), i16::MIN);
        assert_eq!(scale_raw_sample(32_768 * 4096), i16::MAX);
        assert_eq!(scale_raw_sample(-32_769 * 4096), i16::MIN);
    }

    #[test]
    fn unit_samples_survive_the_raw_path() {
        assert_eq!(scale_raw_sample(raw_from_unit(1.0)), i16::MAX);
        assert_eq!(scale_raw_sample(raw_from_unit(-1.0)), -i16::MAX);
        assert_eq!(scale_raw_sample(raw_from_unit(0.0)), 0);
        // Out-of-range floats clip before scaling.
        assert_eq!(scale_raw_sample(raw_from_unit(3.5)), i16::MAX);
    }
}
