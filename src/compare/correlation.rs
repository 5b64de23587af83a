use crate::transform::Transformation;
use crate::vectorize::{Shift, SpectrumVector, Vectorization, Vectorizer};

use super::{pearson, ComparisonState, SpectrumComparator};

/// Scores spectra by Pearson's correlation coefficient of their vectors
#[derive(Debug, Clone)]
pub struct PearsonCorrelation {
    state: ComparisonState,
}

impl PearsonCorrelation {
    pub fn new(vectorization: Vectorization, transformation: Transformation) -> Self {
        Self {
            state: ComparisonState::new(Vectorizer::new(vectorization, transformation)),
        }
    }
}

impl SpectrumComparator for PearsonCorrelation {
    fn state(&self) -> &ComparisonState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ComparisonState {
        &mut self.state
    }

    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64> {
        let (a, b) = self.state.vectorizer.align(candidate, Shift::NONE);
        pearson(a, b)
    }
}

/// Scores spectra by the highest Pearson correlation found while sliding the
/// candidate up to `offset` bins of `bin_width` to either side of the query.
///
/// This tolerates small systematic m/z shifts between the two spectra.
#[derive(Debug, Clone)]
pub struct CrossCorrelation {
    state: ComparisonState,
    bin_width: f64,
    offset: usize,
}

impl CrossCorrelation {
    pub fn new(
        vectorization: Vectorization,
        transformation: Transformation,
        bin_width: f64,
        offset: usize,
    ) -> Self {
        Self {
            state: ComparisonState::new(Vectorizer::new(vectorization, transformation)),
            bin_width,
            offset,
        }
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl SpectrumComparator for CrossCorrelation {
    fn state(&self) -> &ComparisonState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ComparisonState {
        &mut self.state
    }

    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64> {
        let offset = self.offset as i64;
        let mut best: Option<f64> = None;
        for lag in -offset..=offset {
            let (a, b) = self
                .state
                .vectorizer
                .align(candidate, Shift::lag(lag, self.bin_width));
            if let Some(r) = pearson(a, b) {
                best = Some(best.map_or(r, |current| current.max(r)));
            }
        }
        best
    }
}
