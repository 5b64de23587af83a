//! Query spectra and peak list helpers built on [`mzpeaks::CentroidPeak`].
use std::cmp::Ordering;
use std::fmt;

use mzpeaks::CentroidPeak;

/// A query spectrum to be annotated by similarity to library spectra.
///
/// The `id` is supplied by the caller and is what a [`SpectrumMatch`](crate::search::SpectrumMatch)
/// refers back to. Peaks are kept sorted by m/z.
#[derive(Debug, Clone, Default)]
pub struct QuerySpectrum {
    pub id: u64,
    pub title: String,
    pub precursor_mz: f64,
    pub charge: Option<i32>,
    pub peaks: Vec<CentroidPeak>,
}

impl QuerySpectrum {
    pub fn new(id: u64, title: String, precursor_mz: f64, charge: Option<i32>, peaks: Vec<CentroidPeak>) -> Self {
        Self {
            id,
            title,
            precursor_mz,
            charge,
            peaks: sorted_peaks(peaks),
        }
    }

    /// Build a spectrum from `(m/z, intensity)` pairs
    pub fn from_pairs(id: u64, title: &str, precursor_mz: f64, pairs: &[(f64, f32)]) -> Self {
        Self::new(id, title.to_string(), precursor_mz, None, peaks_from_pairs(pairs))
    }

    /// The `pick_count` most intense peaks, see [`highest_peaks`]
    pub fn highest_peaks(&self, pick_count: usize) -> Vec<CentroidPeak> {
        highest_peaks(&self.peaks, pick_count)
    }
}

impl fmt::Display for QuerySpectrum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "QuerySpectrum({}, {}, {:.4}, <{} Peaks>)",
            self.id,
            self.title,
            self.precursor_mz,
            self.peaks.len()
        )
    }
}

/// Sort peaks by m/z and renumber their `index` to match their position.
pub fn sorted_peaks(mut peaks: Vec<CentroidPeak>) -> Vec<CentroidPeak> {
    peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    for (i, p) in peaks.iter_mut().enumerate() {
        p.index = i as u32;
    }
    peaks
}

pub fn peaks_from_pairs(pairs: &[(f64, f32)]) -> Vec<CentroidPeak> {
    sorted_peaks(
        pairs
            .iter()
            .map(|(mz, intensity)| CentroidPeak::new(*mz, *intensity, 0))
            .collect(),
    )
}

/// Select the `k` most intense peaks and return them sorted by m/z.
///
/// Ties in intensity prefer the lower m/z peak so the selection does not depend
/// on the sort algorithm. When `k` is at least the number of peaks, every peak
/// is returned.
pub fn highest_peaks(peaks: &[CentroidPeak], k: usize) -> Vec<CentroidPeak> {
    if k >= peaks.len() {
        return sorted_peaks(peaks.to_vec());
    }
    let mut ranked: Vec<&CentroidPeak> = peaks.iter().collect();
    ranked.sort_by(|a, b| match b.intensity.total_cmp(&a.intensity) {
        Ordering::Equal => a.mz.total_cmp(&b.mz),
        ord => ord,
    });
    sorted_peaks(ranked.into_iter().take(k).cloned().collect())
}
