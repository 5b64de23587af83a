//! Spectrum comparators score a candidate spectrum against a prepared query.
//!
//! Every comparator follows the same two phase protocol: a query is
//! [prepared](SpectrumComparator::prepare) once, any number of candidates are
//! [compared](SpectrumComparator::compare_to) against it, and the per-query state is
//! [cleaned up](SpectrumComparator::cleanup) before the next query. The
//! [`ComparisonSession`] guard returned by [`SpectrumComparator::session`] ties the
//! cleanup to scope exit.
use log::trace;
use mzpeaks::CentroidPeak;

mod correlation;
mod dot_product;
mod euclidean;

pub use correlation::{CrossCorrelation, PearsonCorrelation};
pub use dot_product::NormalizedDotProduct;
pub use euclidean::EuclideanDistance;

use crate::settings::{ComparatorKind, ConfigurationError, SpecSimSettings};
use crate::transform::Transformation;
use crate::vectorize::{SpectrumVector, Vectorization, Vectorizer};

/// The similarity reported for degenerate comparisons: empty spectra, zero norm
/// or zero variance vectors.
pub const MIN_SIMILARITY: f64 = 0.0;

/// The mutable state shared by all comparators
#[derive(Debug, Clone)]
pub struct ComparisonState {
    vectorizer: Vectorizer,
    similarity: f64,
    compared: usize,
    degenerate: usize,
}

impl ComparisonState {
    pub fn new(vectorizer: Vectorizer) -> Self {
        Self {
            vectorizer,
            similarity: MIN_SIMILARITY,
            compared: 0,
            degenerate: 0,
        }
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }
}

pub trait SpectrumComparator {
    fn state(&self) -> &ComparisonState;

    fn state_mut(&mut self) -> &mut ComparisonState;

    /// Score an encoded candidate against the prepared query, returning `None`
    /// when the pair is degenerate.
    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64>;

    fn vectorizer(&self) -> &Vectorizer {
        &self.state().vectorizer
    }

    fn prepare(&mut self, query: &[CentroidPeak]) {
        let state = self.state_mut();
        state.vectorizer.prepare(query);
        state.similarity = MIN_SIMILARITY;
    }

    fn is_prepared(&self) -> bool {
        self.state().vectorizer.is_prepared()
    }

    /// Encode `candidate`, score it against the prepared query and cache the result,
    /// which is also returned.
    fn compare_to(&mut self, candidate: &[CentroidPeak]) -> f64 {
        let encoded = self.state().vectorizer.vectorize(candidate);
        let score = self.score(&encoded);
        let state = self.state_mut();
        state.compared += 1;
        state.similarity = match score {
            Some(score) if score.is_finite() => score,
            _ => {
                state.degenerate += 1;
                trace!("Degenerate comparison with {} candidate peaks", candidate.len());
                MIN_SIMILARITY
            }
        };
        state.similarity
    }

    /// The similarity computed by the last call to [`SpectrumComparator::compare_to`]
    fn similarity(&self) -> f64 {
        self.state().similarity
    }

    /// Release the prepared query and any buffers. May be called repeatedly, and
    /// on a comparator that was never prepared.
    fn cleanup(&mut self) {
        let state = self.state_mut();
        state.vectorizer.release();
        state.similarity = MIN_SIMILARITY;
    }

    /// The number of comparisons made over this comparator's lifetime
    fn comparison_count(&self) -> usize {
        self.state().compared
    }

    /// The number of comparisons that resolved to [`MIN_SIMILARITY`] because the
    /// inputs were degenerate
    fn degenerate_count(&self) -> usize {
        self.state().degenerate
    }

    /// Prepare `query` and return a guard that cleans up when dropped
    fn session(&mut self, query: &[CentroidPeak]) -> ComparisonSession<'_, Self>
    where
        Self: Sized,
    {
        self.prepare(query);
        ComparisonSession { comparator: self }
    }
}

/// A prepared query. The comparator is cleaned up when the session goes out of
/// scope, however that happens.
pub struct ComparisonSession<'a, C: SpectrumComparator> {
    comparator: &'a mut C,
}

impl<C: SpectrumComparator> ComparisonSession<'_, C> {
    pub fn compare_to(&mut self, candidate: &[CentroidPeak]) -> f64 {
        self.comparator.compare_to(candidate)
    }

    pub fn similarity(&self) -> f64 {
        self.comparator.similarity()
    }

    pub fn comparator(&self) -> &C {
        self.comparator
    }
}

impl<C: SpectrumComparator> Drop for ComparisonSession<'_, C> {
    fn drop(&mut self) {
        self.comparator.cleanup();
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine of the angle between `a` and `b`, `None` if either has zero norm
pub fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let norm_a = dot(a, a);
    let norm_b = dot(b, b);
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    Some((dot(a, b) / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0))
}

/// `1 / (1 + d)` where `d` is the Euclidean distance between `a` and `b` after
/// both are scaled to unit length. `None` if either has zero norm.
pub fn euclidean_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    let distance = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x / norm_a - y / norm_b;
            d * d
        })
        .sum::<f64>()
        .sqrt();
    Some(1.0 / (1.0 + distance))
}

/// Pearson's correlation coefficient of `a` and `b`.
///
/// `None` when either vector has fewer than two non-zero entries or no variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    let non_zero = |v: &[f64]| v.iter().filter(|x| **x != 0.0).count();
    if n < 2 || non_zero(&a[..n]) < 2 || non_zero(&b[..n]) < 2 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa <= 0.0 || sbb <= 0.0 {
        return None;
    }
    Some((sab / (saa * sbb).sqrt()).clamp(-1.0, 1.0))
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $e:expr) => {
        match $self {
            Comparator::Euclidean($inner) => $e,
            Comparator::NormalizedDotProduct($inner) => $e,
            Comparator::Pearson($inner) => $e,
            Comparator::CrossCorrelation($inner) => $e,
        }
    };
}

/// One of the supported comparators, selected by [`ComparatorKind`]
#[derive(Debug, Clone)]
pub enum Comparator {
    Euclidean(EuclideanDistance),
    NormalizedDotProduct(NormalizedDotProduct),
    Pearson(PearsonCorrelation),
    CrossCorrelation(CrossCorrelation),
}

impl Comparator {
    pub fn new(
        kind: ComparatorKind,
        vectorization: Vectorization,
        transformation: Transformation,
        bin_width: f64,
        xcorr_offset: usize,
    ) -> Self {
        match kind {
            ComparatorKind::Euclidean => {
                Self::Euclidean(EuclideanDistance::new(vectorization, transformation))
            }
            ComparatorKind::NormalizedDotProduct => {
                Self::NormalizedDotProduct(NormalizedDotProduct::new(vectorization, transformation))
            }
            ComparatorKind::Pearson => {
                Self::Pearson(PearsonCorrelation::new(vectorization, transformation))
            }
            ComparatorKind::CrossCorrelation => Self::CrossCorrelation(CrossCorrelation::new(
                vectorization,
                transformation,
                bin_width,
                xcorr_offset,
            )),
        }
    }

    /// Validate `settings` and build the comparator they describe
    pub fn from_settings(settings: &SpecSimSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        Ok(Self::new(
            settings.comparator,
            settings.build_vectorization()?,
            settings.transformation.into(),
            settings.bin_width,
            settings.xcorr_offset,
        ))
    }

    pub fn kind(&self) -> ComparatorKind {
        match self {
            Self::Euclidean(_) => ComparatorKind::Euclidean,
            Self::NormalizedDotProduct(_) => ComparatorKind::NormalizedDotProduct,
            Self::Pearson(_) => ComparatorKind::Pearson,
            Self::CrossCorrelation(_) => ComparatorKind::CrossCorrelation,
        }
    }
}

impl SpectrumComparator for Comparator {
    fn state(&self) -> &ComparisonState {
        dispatch!(self, inner => inner.state())
    }

    fn state_mut(&mut self) -> &mut ComparisonState {
        dispatch!(self, inner => inner.state_mut())
    }

    fn score(&mut self, candidate: &SpectrumVector) -> Option<f64> {
        dispatch!(self, inner => inner.score(candidate))
    }
}

#[cfg(test)]
mod test {
    use std::panic;

    use super::*;
    use crate::peaks::peaks_from_pairs;
    use crate::settings::VectorizationKind;

    fn binned(kind: ComparatorKind) -> Comparator {
        Comparator::new(
            kind,
            Vectorization::direct_binning(1.0, 0.0),
            Transformation::None,
            1.0,
            2,
        )
    }

    #[test]
    fn test_metrics() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0];
        assert_eq!(cosine(&a, &a), Some(1.0));
        assert_eq!(cosine(&a, &b), cosine(&b, &a));
        assert_eq!(cosine(&a, &[0.0, 0.0, 0.0]), None);

        assert_eq!(pearson(&a, &a), Some(1.0));
        assert!((pearson(&a, &b).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&a, &[2.0, 2.0, 2.0]), None);
        assert_eq!(pearson(&[0.0, 5.0, 0.0], &a), None);

        assert_eq!(euclidean_similarity(&a, &a), Some(1.0));
        assert_eq!(euclidean_similarity(&a, &[2.0, 4.0, 6.0]), Some(1.0));
        let orthogonal = euclidean_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((orthogonal - 1.0 / (1.0 + 2f64.sqrt())).abs() < 1e-12);
        assert_eq!(euclidean_similarity(&[], &[]), None);
    }

    #[test]
    fn test_dot_product_symmetric() {
        let x = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0), (350.0, 10.0)]);
        let y = peaks_from_pairs(&[(100.2, 30.0), (201.0, 80.0), (420.0, 15.0)]);

        let mut comparator = binned(ComparatorKind::NormalizedDotProduct);
        comparator.prepare(&x);
        let xy = comparator.compare_to(&y);
        assert_eq!(comparator.compare_to(&x), 1.0);
        comparator.cleanup();

        comparator.prepare(&y);
        let yx = comparator.compare_to(&x);
        comparator.cleanup();

        assert_eq!(xy, yx);
        assert!(xy > 0.0 && xy < 1.0);
    }

    #[test]
    fn test_identical_spectra() {
        let x = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0), (350.0, 10.0)]);
        for kind in ComparatorKind::ALL {
            let mut comparator = binned(*kind);
            let mut session = comparator.session(&x);
            let score = session.compare_to(&x);
            assert!((score - 1.0).abs() < 1e-12, "{kind} scored {score}");
            assert_eq!(session.similarity(), score);
        }
    }

    #[test]
    fn test_pearson_anticorrelated() {
        let x = peaks_from_pairs(&[(100.0, 1.0), (101.0, 2.0), (102.0, 3.0)]);
        let y = peaks_from_pairs(&[(100.0, 3.0), (101.0, 2.0), (102.0, 1.0)]);
        let mut comparator = binned(ComparatorKind::Pearson);
        let mut session = comparator.session(&x);
        assert!((session.compare_to(&y) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cross_correlation_lag() {
        let x = peaks_from_pairs(&[(100.0, 10.0), (105.0, 40.0), (110.0, 20.0), (118.0, 5.0)]);
        let y = peaks_from_pairs(&[(101.0, 10.0), (106.0, 40.0), (111.0, 20.0), (119.0, 5.0)]);

        let mut plain = binned(ComparatorKind::Pearson);
        let unshifted = plain.session(&x).compare_to(&y);
        assert!(unshifted < 0.5);

        let mut xcorr = binned(ComparatorKind::CrossCorrelation);
        let shifted = xcorr.session(&x).compare_to(&y);
        assert!((shifted - 1.0).abs() < 1e-12);

        let mut narrow = Comparator::new(
            ComparatorKind::CrossCorrelation,
            Vectorization::direct_binning(1.0, 0.0),
            Transformation::None,
            1.0,
            0,
        );
        assert_eq!(narrow.session(&x).compare_to(&y), unshifted);
    }

    #[test]
    fn test_cross_correlation_peak_matching() {
        let x = peaks_from_pairs(&[(100.0, 10.0), (105.0, 40.0), (110.0, 20.0)]);
        let y = peaks_from_pairs(&[(100.5, 10.0), (105.5, 40.0), (110.5, 20.0)]);
        let mut xcorr = Comparator::new(
            ComparatorKind::CrossCorrelation,
            Vectorization::peak_matching(0.1),
            Transformation::None,
            0.5,
            1,
        );
        let score = xcorr.session(&x).compare_to(&y);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate() {
        let x = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0)]);
        let single = peaks_from_pairs(&[(100.0, 50.0)]);
        for kind in ComparatorKind::ALL {
            let mut comparator = binned(*kind);
            {
                let mut session = comparator.session(&x);
                assert_eq!(session.compare_to(&[]), MIN_SIMILARITY);
            }
            assert_eq!(comparator.degenerate_count(), 1);
            assert_eq!(comparator.comparison_count(), 1);

            let mut session = comparator.session(&[]);
            assert_eq!(session.compare_to(&x), MIN_SIMILARITY);
            drop(session);

            if matches!(kind, ComparatorKind::Pearson | ComparatorKind::CrossCorrelation) {
                let mut session = comparator.session(&single);
                assert_eq!(session.compare_to(&x), MIN_SIMILARITY);
            }
        }
    }

    #[test]
    fn test_cleanup_idempotent() {
        for kind in ComparatorKind::ALL {
            let mut comparator = binned(*kind);
            comparator.cleanup();
            comparator.cleanup();
            assert!(!comparator.is_prepared());
            assert_eq!(comparator.similarity(), MIN_SIMILARITY);
        }
    }

    #[test]
    fn test_no_stale_query() {
        let x = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0)]);
        let mut comparator = binned(ComparatorKind::NormalizedDotProduct);
        {
            let mut session = comparator.session(&x);
            assert_eq!(session.compare_to(&x), 1.0);
        }
        assert!(!comparator.is_prepared());
        assert_eq!(comparator.vectorizer().buffer_capacity(), 0);
        assert_eq!(comparator.compare_to(&x), MIN_SIMILARITY);
    }

    #[test]
    fn test_session_cleans_up_on_panic() {
        let x = peaks_from_pairs(&[(100.0, 50.0), (200.0, 80.0)]);
        let mut comparator = binned(ComparatorKind::Euclidean);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let mut session = comparator.session(&x);
            session.compare_to(&x);
            panic!("failure while scoring");
        }));
        assert!(result.is_err());
        assert!(!comparator.is_prepared());
    }

    #[test]
    fn test_from_settings() {
        let settings = SpecSimSettings::default()
            .with_vectorization(VectorizationKind::PeakMatching)
            .with_comparator(ComparatorKind::Pearson);
        let comparator = Comparator::from_settings(&settings).unwrap();
        assert_eq!(comparator.kind(), ComparatorKind::Pearson);
        assert_eq!(
            *comparator.vectorizer().vectorization(),
            Vectorization::peak_matching(1.0)
        );

        let bad = settings.with_binning(-1.0, 0.0);
        assert_eq!(
            Comparator::from_settings(&bad).unwrap_err(),
            ConfigurationError::InvalidBinWidth(-1.0)
        );
    }
}
