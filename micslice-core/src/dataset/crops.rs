//! Stratified random crop selection.
//!
//! ## Algorithm
//!
//! Candidate crop starts sit on a grid of `step` samples:
//! `0, step, 2·step, …, (max_crops − 1)·step`, where
//! `max_crops = (total − window) / step + 1`.
//!
//! 1. `total < window` → no crops.
//! 2. Clamp the requested count `k` to `max_crops`.
//! 3. `k ≤ 1` → one crop centred on the recording (`(total − window) / 2`).
//! 4. Otherwise split `[0, max_crops)` into `k` contiguous bins of near-equal
//!    width and draw one grid index uniformly from each bin. A taken index is
//!    searched forward inside its bin (wrapping at the bin end), then across the
//!    whole grid.
//! 5. Sort the indices and scale by `step`.
//!
//! One crop per bin spreads windows over the whole utterance; the draw inside
//! each bin keeps the dataset from repeating a single offset pattern.

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{MicsliceError, Result};

/// Ordered crop start offsets for one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropPlan {
    pub total_samples: usize,
    pub window_samples: usize,
    /// Ascending, pairwise distinct, each `offset + window_samples <= total_samples`.
    pub offsets: Vec<usize>,
}

impl CropPlan {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// `(start, end)` sample ranges of every crop.
    pub fn windows(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.offsets
            .iter()
            .map(move |&offset| offset..offset + self.window_samples)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CropSelector {
    window: usize,
    step: usize,
}

impl CropSelector {
    /// # Errors
    /// `MicsliceError::InvalidArgument` for a zero window or zero step.
    pub fn new(window: usize, step: usize) -> Result<Self> {
        if window == 0 || step == 0 {
            return Err(MicsliceError::InvalidArgument(format!(
                "crop window and step must be non-zero (window={window}, step={step})"
            )));
        }
        Ok(Self { window, step })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of grid positions a window fits at; zero for short input.
    pub fn max_crops(&self, total: usize) -> usize {
        if total < self.window {
            return 0;
        }
        (total - self.window) / self.step + 1
    }

    /// Plan up to `requested` crops over `total` samples.
    pub fn plan<R: Rng + ?Sized>(&self, total: usize, requested: usize, rng: &mut R) -> CropPlan {
        let mut plan = CropPlan {
            total_samples: total,
            window_samples: self.window,
            offsets: Vec::new(),
        };

        let max_crops = self.max_crops(total);
        if max_crops == 0 {
            debug!(total, window = self.window, "recording shorter than one window");
            return plan;
        }

        let margin = total - self.window;
        let k = requested.min(max_crops);
        if k <= 1 {
            plan.offsets.push(margin / 2);
            return plan;
        }

        let mut used = vec![false; max_crops];
        let mut picked = Vec::with_capacity(k);

        for bin in 0..k {
            let mut start = bin * max_crops / k;
            let mut end = (bin + 1) * max_crops / k;
            if end == 0 {
                continue;
            }
            end = (end - 1).min(max_crops - 1);
            if start > end {
                start = end;
            }

            let span = end - start + 1;
            let mut idx = start + rng.gen_range(0..span);

            for _ in 0..span {
                if !used[idx] {
                    break;
                }
                idx = if idx == end { start } else { idx + 1 };
            }

            if used[idx] {
                match (0..max_crops)
                    .map(|j| (idx + j) % max_crops)
                    .find(|&candidate| !used[candidate])
                {
                    Some(free) => idx = free,
                    None => {
                        warn!(bin, k, max_crops, "no free crop position left");
                        continue;
                    }
                }
            }

            used[idx] = true;
            picked.push(idx);
        }

        picked.sort_unstable();
        plan.offsets = picked.into_iter().map(|idx| idx * self.step).collect();
        plan
    }
}

/// Plan crops with the thread-local RNG.
///
/// # Errors
/// `MicsliceError::InvalidArgument` for a zero window or step.
pub fn plan_crops(total: usize, window: usize, count: usize, step: usize) -> Result<CropPlan> {
    Ok(CropSelector::new(window, step)?.plan(total, count, &mut rand::thread_rng()))
}
