//! Slice classifier abstraction.
//!
//! The `Classifier` trait decouples the streaming consumer from any specific
//! model. A classifier sees one slice at a time as plain floats (the 16-bit
//! samples widened, not normalised) and returns one raw score per label.
//!
//! `&mut self` on `classify` lets backends keep state between slices (rolling
//! feature windows, recurrent state). All calls go through `ClassifierHandle`'s
//! `parking_lot::Mutex`.

pub mod energy;
pub mod runner;
pub mod smoothing;

pub use energy::EnergyClassifier;
pub use runner::SliceClassifier;
pub use smoothing::{ScoreSmoother, TopScore};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Contract for slice classifiers.
pub trait Classifier: Send + 'static {
    /// Class labels, in score order.
    fn labels(&self) -> &[String];

    /// Exact number of samples `classify` accepts.
    fn input_len(&self) -> usize;

    /// Score one slice.
    ///
    /// # Errors
    /// Implementations fail when `slice.len() != self.input_len()`.
    fn classify(&mut self, slice: &[f32]) -> Result<Vec<f32>>;
}

/// Thread-safe reference-counted handle to any `Classifier` implementor.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn Classifier>>);

impl ClassifierHandle {
    pub fn new<C: Classifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}
