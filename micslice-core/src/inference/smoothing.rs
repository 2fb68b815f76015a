//! Exponential smoothing of per-class scores.
//!
//! Every tick: `ema[i] = s * ema[i] + (1 - s) * raw[i]` for all classes, then
//! the top class is the first index holding the maximum smoothed value. Scores
//! are never renormalised and only reset by constructing a new smoother.

use crate::error::{MicsliceError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopScore {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScoreSmoother {
    ema: Vec<f32>,
    smoothing: f32,
    top: Option<TopScore>,
}

impl ScoreSmoother {
    /// # Errors
    /// `MicsliceError::InvalidArgument` unless `0 < smoothing < 1`.
    pub fn new(classes: usize, smoothing: f32) -> Result<Self> {
        if !(smoothing > 0.0 && smoothing < 1.0) {
            return Err(MicsliceError::InvalidArgument(format!(
                "smoothing factor must be in (0, 1), got {smoothing}"
            )));
        }
        Ok(Self {
            ema: vec![0.0; classes],
            smoothing,
            top: None,
        })
    }

    /// Fold one tick of raw scores into the running averages.
    ///
    /// # Errors
    /// `MicsliceError::Classifier` if the score count does not match the class count.
    pub fn update(&mut self, raw: &[f32]) -> Result<Option<TopScore>> {
        if raw.len() != self.ema.len() {
            return Err(MicsliceError::Classifier(format!(
                "expected {} scores, got {}",
                self.ema.len(),
                raw.len()
            )));
        }

        let s = self.smoothing;
        let mut top: Option<TopScore> = None;
        for (index, (ema, &score)) in self.ema.iter_mut().zip(raw).enumerate() {
            *ema = s * *ema + (1.0 - s) * score;
            if top.map_or(true, |t| *ema > t.score) {
                top = Some(TopScore { index, score: *ema });
            }
        }

        self.top = top;
        Ok(top)
    }

    pub fn top(&self) -> Option<TopScore> {
        self.top
    }

    pub fn scores(&self) -> &[f32] {
        &self.ema
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_ticks_at_half_smoothing() {
        let mut smoother = ScoreSmoother::new(3, 0.5).unwrap();

        let top = smoother.update(&[1.0, 0.0, 0.0]).unwrap().unwrap();
        assert_relative_eq!(smoother.scores()[0], 0.5);
        assert_eq!(top.index, 0);

        let top = smoother.update(&[1.0, 0.0, 0.0]).unwrap().unwrap();
        assert_relative_eq!(smoother.scores()[0], 0.75);
        assert_relative_eq!(smoother.scores()[1], 0.0);
        assert_eq!(top.index, 0);
        assert_relative_eq!(top.score, 0.75);
    }

    #[test]
    fn ties_go_to_the_lowest_index() {
        let mut smoother = ScoreSmoother::new(3, 0.5).unwrap();
        let top = smoother.update(&[0.2, 0.6, 0.6]).unwrap().unwrap();
        assert_eq!(top.index, 1);

        let mut flat = ScoreSmoother::new(2, 0.9).unwrap();
        assert_eq!(flat.update(&[0.0, 0.0]).unwrap().unwrap().index, 0);
    }

    #[test]
    fn history_outweighs_a_single_spike() {
        let mut smoother = ScoreSmoother::new(2, 0.8).unwrap();
        for _ in 0..10 {
            smoother.update(&[1.0, 0.0]).unwrap();
        }
        let top = smoother.update(&[0.0, 1.0]).unwrap().unwrap();
        assert_eq!(top.index, 0);
        assert_relative_eq!(smoother.scores()[1], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn smoothing_bounds_are_exclusive() {
        assert!(ScoreSmoother::new(2, 0.0).is_err());
        assert!(ScoreSmoother::new(2, 1.0).is_err());
        assert!(ScoreSmoother::new(2, f32::NAN).is_err());
    }

    #[test]
    fn score_count_mismatch_is_an_error() {
        let mut smoother = ScoreSmoother::new(2, 0.5).unwrap();
        assert!(smoother.update(&[1.0]).is_err());
    }

    #[test]
    fn empty_model_has_no_top() {
        let mut smoother = ScoreSmoother::new(0, 0.5).unwrap();
        assert_eq!(smoother.update(&[]).unwrap(), None);
    }
}
