//! `SliceClassifier`: the inference-side consumer loop body.
//!
//! One `tick()` waits for the next slice, widens it into a reused float
//! buffer, runs the classifier once, and folds the raw scores into the
//! smoother. The slice is read in place; the float copy is the classifier's
//! input format, not a hand-off of ownership.

use tracing::debug;

use super::{ClassifierHandle, ScoreSmoother};
use crate::capture::SliceConsumer;
use crate::error::{MicsliceError, Result};
use crate::events::{ClassificationEvent, TopClass};

pub struct SliceClassifier {
    consumer: SliceConsumer,
    model: ClassifierHandle,
    smoother: ScoreSmoother,
    scratch: Vec<f32>,
    labels: Vec<String>,
    seq: u64,
}

impl SliceClassifier {
    /// # Errors
    /// - `MicsliceError::ClassifierInput` when the stream slice size differs
    ///   from the classifier's input length.
    /// - `MicsliceError::InvalidArgument` for a smoothing factor outside (0, 1).
    pub fn new(consumer: SliceConsumer, model: ClassifierHandle, smoothing: f32) -> Result<Self> {
        let (labels, input_len) = {
            let m = model.0.lock();
            (m.labels().to_vec(), m.input_len())
        };
        if consumer.slice_samples() != input_len {
            return Err(MicsliceError::ClassifierInput {
                expected: input_len,
                actual: consumer.slice_samples(),
            });
        }
        let smoother = ScoreSmoother::new(labels.len(), smoothing)?;

        Ok(Self {
            consumer,
            model,
            smoother,
            scratch: vec![0.0; input_len],
            labels,
            seq: 0,
        })
    }

    /// Wait for one slice, classify it and return the smoothed result.
    ///
    /// # Errors
    /// `MicsliceError::SliceNotReady` when the caller fell behind,
    /// `MicsliceError::NotRunning` once capture stops, or the classifier's error.
    pub fn tick(&mut self) -> Result<ClassificationEvent> {
        let slice = self.consumer.wait_for_slice()?;
        slice.copy_to_f32(&mut self.scratch)?;
        let slot = slice.slot_index();

        let raw = self.model.0.lock().classify(&self.scratch)?;
        let top = self.smoother.update(&raw)?;

        self.seq += 1;
        let event = ClassificationEvent {
            seq: self.seq,
            top: top.map(|t| TopClass {
                index: t.index,
                label: self.labels.get(t.index).cloned().unwrap_or_default(),
                score: t.score,
            }),
            scores: self.smoother.scores().to_vec(),
            overruns: self.consumer.overruns(),
        };
        debug!(seq = self.seq, slot, top = ?event.top, "slice classified");
        Ok(event)
    }

    pub fn smoother(&self) -> &ScoreSmoother {
        &self.smoother
    }

    pub fn consumer(&self) -> &SliceConsumer {
        &self.consumer
    }
}
