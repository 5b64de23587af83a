use crate::transform::Transformation;
use crate::vectorize::{Shift, SpectrumVector, Vectorization, Vectorizer};

use super::{euclidean_similarity, ComparisonState, SpectrumComparator};

/// Scores spectra by `1 / (1 + d)`, where `d` is the distance between the two
/// unit-length vectors. Identical spectra score 1 and spectra with no shared
/// signal score `1 / (1 + sqrt(2))`.
#[derive(Debug, Clone)]
pub struct EuclideanDistance {
    state: ComparisonState,
}

impl EuclideanDistance {
    pub fn new(vectorization: Vectorization, transformation: Transformation) -> Self {
        Self {
            state: ComparisonState::new(Vectorizer::new(vectorization, transformation)),
        }
    }
}

impl SpectrumComparator for EuclideanDistance {
    fn state(&self) -> &ComparisonState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ComparisonState {
        &mut self.state
    }

    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64> {
        let (a, b) = self.state.vectorizer.align(candidate, Shift::NONE);
        euclidean_similarity(a, b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peaks::peaks_from_pairs;

    #[test]
    fn test_scale_invariant() {
        let x = peaks_from_pairs(&[(100.0, 5.0), (200.0, 8.0)]);
        let y = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0)]);
        let z = peaks_from_pairs(&[(300.0, 50.0)]);
        let mut comparator =
            EuclideanDistance::new(Vectorization::direct_binning(1.0, 0.0), Transformation::None);
        let mut session = comparator.session(&x);
        assert!((session.compare_to(&y) - 1.0).abs() < 1e-12);
        let disjoint = session.compare_to(&z);
        assert!((disjoint - 1.0 / (1.0 + 2f64.sqrt())).abs() < 1e-12);
    }
}
