//! Fixed-ratio sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Live devices capture at their native rate (commonly 44.1 or 48 kHz) and
//! replayed files carry whatever rate they were saved with. The dataset and the
//! classifier both expect the configured capture rate, so both backends feed
//! their float samples through a `RateConverter` before producing raw words.
//!
//! Equal rates skip rubato entirely and copy the input through.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{MicsliceError, Result};

/// Converts mono f32 audio between two fixed sample rates.
pub struct RateConverter {
    /// `None` when source and target rates match.
    resampler: Option<FastFixedIn<f32>>,
    /// Input carried over until a full block is available.
    pending: Vec<f32>,
    /// Input frames rubato consumes per call.
    block: usize,
    /// Reused output storage, one channel.
    out: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `MicsliceError::Peripheral` if rubato rejects the ratio or block size.
    pub fn new(source_rate: u32, target_rate: u32, block: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 || block == 0 {
            return Err(MicsliceError::InvalidArgument(format!(
                "resampler needs non-zero rates and block (source={source_rate}, target={target_rate}, block={block})"
            )));
        }

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block,
                out: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            block,
            1,
        )
        .map_err(|e| MicsliceError::Peripheral(format!("resampler init: {e}")))?;

        let out = vec![vec![0f32; resampler.output_frames_max()]; 1];
        debug!(source_rate, target_rate, block, "resampler ready");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(block * 2),
            block,
            out,
        })
    }

    /// Feed samples and collect whatever full blocks produced.
    ///
    /// The remainder below one block stays queued for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut converted = Vec::new();

        let mut start = 0;
        while self.pending.len() - start >= self.block {
            let block = &self.pending[start..start + self.block];
            match resampler.process_into_buffer(&[block], &mut self.out, None) {
                Ok((_, produced)) => converted.extend_from_slice(&self.out[0][..produced]),
                Err(e) => error!("resampler block failed: {e}"),
            }
            start += self.block;
        }
        self.pending.drain(..start);

        converted
    }

    /// Push out the queued tail, zero-padded to one block by rubato.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };
        if self.pending.is_empty() {
            return Vec::new();
        }

        let tail = std::mem::take(&mut self.pending);
        let input = [tail.as_slice()];
        match resampler.process_partial_into_buffer(Some(&input[..]), &mut self.out, None) {
            Ok((_, produced)) => self.out[0][..produced].to_vec(),
            Err(e) => {
                error!("resampler flush failed: {e}");
                Vec::new()
            }
        }
    }

    /// Convert a complete buffer in one go (process + flush).
    pub fn convert_all(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut converted = self.process(samples);
        converted.extend(self.flush());
        converted
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
