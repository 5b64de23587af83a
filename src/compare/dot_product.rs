use crate::transform::Transformation;
use crate::vectorize::{Shift, SpectrumVector, Vectorization, Vectorizer};

use super::{cosine, ComparisonState, SpectrumComparator};

/// Scores spectra by the cosine of the angle between their vectors, which lies
/// in `[0, 1]` for non-negative intensities.
#[derive(Debug, Clone)]
pub struct NormalizedDotProduct {
    state: ComparisonState,
}

impl NormalizedDotProduct {
    pub fn new(vectorization: Vectorization, transformation: Transformation) -> Self {
        Self {
            state: ComparisonState::new(Vectorizer::new(vectorization, transformation)),
        }
    }
}

impl SpectrumComparator for NormalizedDotProduct {
    fn state(&self) -> &ComparisonState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ComparisonState {
        &mut self.state
    }

    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64> {
        let (a, b) = self.state.vectorizer.align(candidate, Shift::NONE);
        cosine(a, b)
    }
}
