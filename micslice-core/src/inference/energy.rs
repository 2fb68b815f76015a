//! `EnergyClassifier`: built-in two-class RMS classifier.
//!
//! ## Algorithm
//!
//! 1. Compute the RMS of the slice (samples in 16-bit units).
//! 2. Map it through a soft knee around `threshold`:
//!    `p = rms / (rms + threshold)`, so `p = 0.5` exactly at the threshold.
//! 3. Scores are `[1 - p, p]` for `["background", "sound"]`.
//!
//! Good enough to drive the live path and smoothing without a trained model.

use tracing::trace;

use super::Classifier;
use crate::error::{MicsliceError, Result};

/// A simple energy-based slice classifier.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    labels: Vec<String>,
    input_len: usize,
    /// RMS in 16-bit sample units where the two classes score equally.
    threshold: f32,
}

impl EnergyClassifier {
    /// # Parameters
    /// - `input_len`: slice length this classifier accepts.
    /// - `threshold`: RMS knee, in 16-bit sample units. Typical: 500–1500.
    pub fn new(input_len: usize, threshold: f32) -> Self {
        Self {
            labels: vec!["background".into(), "sound".into()],
            input_len,
            threshold: threshold.max(f32::EPSILON),
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Classifier for EnergyClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn classify(&mut self, slice: &[f32]) -> Result<Vec<f32>> {
        if slice.len() != self.input_len {
            return Err(MicsliceError::ClassifierInput {
                expected: self.input_len,
                actual: slice.len(),
            });
        }
        let rms = Self::rms(slice);
        let p = rms / (rms + self.threshold);
        trace!(rms, p, "energy classify");
        Ok(vec![1.0 - p, p])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_scores_as_background() {
        let mut c = EnergyClassifier::new(160, 1000.0);
        let scores = c.classify(&[0.0; 160]).unwrap();
        assert_eq!(scores, vec![1.0, 0.0]);
    }

    #[test]
    fn loud_slice_scores_as_sound() {
        let mut c = EnergyClassifier::new(160, 1000.0);
        let scores = c.classify(&[9000.0; 160]).unwrap();
        assert!(scores[1] > 0.85, "scores={scores:?}");
    }

    #[test]
    fn threshold_is_the_even_point() {
        let mut c = EnergyClassifier::new(4, 1000.0);
        let scores = c.classify(&[1000.0, -1000.0, 1000.0, -1000.0]).unwrap();
        assert!((scores[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut c = EnergyClassifier::new(160, 1000.0);
        assert!(matches!(
            c.classify(&[0.0; 10]),
            Err(MicsliceError::ClassifierInput {
                expected: 160,
                actual: 10
            })
        ));
    }
}
