//! Conversion of peak lists into numeric vectors that can be compared across
//! spectra with different numbers of peaks.
//!
//! A [`Vectorization`] describes *how* a peak list is encoded, producing a
//! [`SpectrumVector`]. A [`Vectorizer`] pairs a vectorization with a
//! [`Transformation`], holds the encoded query spectrum, and owns the scratch
//! buffers that two encoded spectra are aligned into before scoring.
use std::fmt;

use log::warn;
use mzpeaks::CentroidPeak;

use crate::peaks::sorted_peaks;
use crate::settings::ConfigurationError;
use crate::transform::Transformation;

/// The most bins a single binned encoding, or the alignment of two, may span.
/// Wider spectra are encoded as empty and score the minimum similarity.
pub const MAX_BINS: usize = 1 << 24;

/// The intensity kernel each peak is spread with under [`Vectorization::Profiling`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProfileShape {
    #[default]
    PiecewiseLinear,
    Gaussian,
}

impl ProfileShape {
    /// Relative weight at `distance` from the peak for a kernel reaching `half_width`
    /// to either side. Zero outside the kernel.
    pub fn weight(&self, distance: f64, half_width: f64) -> f64 {
        let distance = distance.abs();
        if distance > half_width {
            return 0.0;
        }
        match self {
            Self::PiecewiseLinear => 1.0 - distance / half_width,
            Self::Gaussian => {
                let sigma = half_width / 2.0;
                (-(distance * distance) / (2.0 * sigma * sigma)).exp()
            }
        }
    }
}

impl TryFrom<i32> for ProfileShape {
    type Error = ConfigurationError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PiecewiseLinear),
            1 => Ok(Self::Gaussian),
            _ => Err(ConfigurationError::UnknownProfileShape(value)),
        }
    }
}

/// How a peak list is turned into a vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Vectorization {
    /// Keep the discrete peaks, pairing peaks of two spectra that lie within
    /// `tolerance` Da of each other.
    PeakMatching { tolerance: f64 },
    /// Sum intensities into fixed width bins starting at `bin_shift`.
    DirectBinning { bin_width: f64, bin_shift: f64 },
    /// Like [`Vectorization::DirectBinning`], but each peak also contributes to the
    /// neighboring bins within `base_width / 2` of it, weighted by `shape`.
    Profiling {
        bin_width: f64,
        bin_shift: f64,
        shape: ProfileShape,
        base_width: f64,
    },
}

impl Vectorization {
    pub fn peak_matching(tolerance: f64) -> Self {
        Self::PeakMatching { tolerance }
    }

    pub fn direct_binning(bin_width: f64, bin_shift: f64) -> Self {
        Self::DirectBinning {
            bin_width,
            bin_shift,
        }
    }

    pub fn profiling(bin_width: f64, bin_shift: f64, shape: ProfileShape, base_width: f64) -> Self {
        Self::Profiling {
            bin_width,
            bin_shift,
            shape,
            base_width,
        }
    }

    /// An encoding of a spectrum with no peaks
    pub fn empty_vector(&self) -> SpectrumVector {
        match self {
            Self::PeakMatching { .. } => SpectrumVector::Peaks(Vec::new()),
            _ => SpectrumVector::Binned(BinnedVector::default()),
        }
    }

    pub fn vectorize(&self, peaks: &[CentroidPeak], transformation: Transformation) -> SpectrumVector {
        match *self {
            Self::PeakMatching { .. } => {
                let transformed: Vec<CentroidPeak> = peaks
                    .iter()
                    .map(|p| {
                        CentroidPeak::new(p.mz, transformation.apply(p.intensity as f64) as f32, 0)
                    })
                    .collect();
                SpectrumVector::Peaks(sorted_peaks(transformed))
            }
            Self::DirectBinning {
                bin_width,
                bin_shift,
            } => {
                let contributions = peaks.iter().map(|p| {
                    (
                        bin_index(p.mz, bin_width, bin_shift),
                        transformation.apply(p.intensity as f64),
                    )
                });
                SpectrumVector::Binned(BinnedVector::accumulate(contributions))
            }
            Self::Profiling {
                bin_width,
                bin_shift,
                shape,
                base_width,
            } => {
                let half_width = base_width / 2.0;
                let reach = (half_width / bin_width).ceil() as i64;
                if reach.saturating_mul(2) >= MAX_BINS as i64 {
                    warn!("A profile reaching {reach} bins to each side exceeds the limit of {MAX_BINS}");
                    return self.empty_vector();
                }
                let mut contributions = Vec::with_capacity((peaks.len() * (2 * reach as usize + 1)).min(MAX_BINS));
                for p in peaks {
                    let intensity = transformation.apply(p.intensity as f64);
                    let center = bin_index(p.mz, bin_width, bin_shift);
                    for k in center.saturating_sub(reach)..=center.saturating_add(reach) {
                        let weight = if k == center {
                            1.0
                        } else {
                            let bin_center = bin_shift + (k as f64 + 0.5) * bin_width;
                            shape.weight(bin_center - p.mz, half_width)
                        };
                        if weight > 0.0 {
                            contributions.push((k, intensity * weight));
                        }
                    }
                }
                SpectrumVector::Binned(BinnedVector::accumulate(contributions.into_iter()))
            }
        }
    }
}

impl fmt::Display for Vectorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeakMatching { tolerance } => write!(f, "peak-matching(tolerance={tolerance})"),
            Self::DirectBinning {
                bin_width,
                bin_shift,
            } => write!(f, "direct-binning(width={bin_width}, shift={bin_shift})"),
            Self::Profiling {
                bin_width,
                bin_shift,
                shape,
                base_width,
            } => write!(
                f,
                "profiling(width={bin_width}, shift={bin_shift}, shape={shape:?}, base={base_width})"
            ),
        }
    }
}

#[inline]
pub fn bin_index(mz: f64, bin_width: f64, bin_shift: f64) -> i64 {
    ((mz - bin_shift) / bin_width).floor() as i64
}

/// A contiguous run of bins starting at bin number `first_bin`. Bins outside the
/// run are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinnedVector {
    pub first_bin: i64,
    pub bins: Vec<f64>,
}

impl BinnedVector {
    fn accumulate<I: Iterator<Item = (i64, f64)>>(contributions: I) -> Self {
        let contributions: Vec<(i64, f64)> = contributions.collect();
        let (lo, hi) = match contributions.iter().map(|(k, _)| *k).fold(None, |acc, k| match acc {
            None => Some((k, k)),
            Some((lo, hi)) => Some((k.min(lo), k.max(hi))),
        }) {
            Some(bounds) => bounds,
            None => return Self::default(),
        };
        let span = hi as i128 - lo as i128 + 1;
        if span > MAX_BINS as i128 {
            warn!("A spectrum spanning {span} bins exceeds the limit of {MAX_BINS}, encoding it as empty");
            return Self::default();
        }
        let mut bins = vec![0.0; span as usize];
        for (k, value) in contributions {
            bins[(k - lo) as usize] += value;
        }
        Self { first_bin: lo, bins }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// One past the last bin number
    pub fn end(&self) -> i64 {
        self.first_bin.saturating_add(self.bins.len() as i64)
    }

    pub fn get(&self, bin: i64) -> f64 {
        if bin < self.first_bin || bin >= self.end() {
            0.0
        } else {
            self.bins[(bin - self.first_bin) as usize]
        }
    }
}

/// An encoded spectrum. Peak lists are sorted by m/z.
#[derive(Debug, Clone)]
pub enum SpectrumVector {
    Peaks(Vec<CentroidPeak>),
    Binned(BinnedVector),
}

impl SpectrumVector {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Peaks(peaks) => peaks.is_empty(),
            Self::Binned(binned) => binned.is_empty(),
        }
    }
}

/// An offset applied to the candidate spectrum during alignment, expressed in
/// bins for binned encodings and in m/z for peak lists.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shift {
    pub bins: i64,
    pub mz: f64,
}

impl Shift {
    pub const NONE: Shift = Shift { bins: 0, mz: 0.0 };

    pub fn lag(lag: i64, bin_width: f64) -> Self {
        Self {
            bins: lag,
            mz: lag as f64 * bin_width,
        }
    }
}

fn align_binned(query: &BinnedVector, candidate: &BinnedVector, lag: i64, a: &mut Vec<f64>, b: &mut Vec<f64>) {
    let candidate_first = candidate.first_bin as i128 + lag as i128;
    let candidate_end = candidate.end() as i128 + lag as i128;
    let (query_first, query_end) = (query.first_bin as i128, query.end() as i128);
    let (lo, hi) = match (query.is_empty(), candidate.is_empty()) {
        (true, true) => return,
        (false, true) => (query_first, query_end),
        (true, false) => (candidate_first, candidate_end),
        (false, false) => (
            query_first.min(candidate_first),
            query_end.max(candidate_end),
        ),
    };
    if hi - lo > MAX_BINS as i128 {
        warn!(
            "Aligned spectra span {} bins, exceeding the limit of {MAX_BINS}",
            hi - lo
        );
        return;
    }
    let n = (hi - lo) as usize;
    a.resize(n, 0.0);
    b.resize(n, 0.0);
    // An empty side has no meaningful `first_bin`, and stays zero-filled
    if !query.is_empty() {
        let q_start = (query_first - lo) as usize;
        a[q_start..q_start + query.bins.len()].copy_from_slice(&query.bins);
    }
    if !candidate.is_empty() {
        let c_start = (candidate_first - lo) as usize;
        b[c_start..c_start + candidate.bins.len()].copy_from_slice(&candidate.bins);
    }
}

/// Greedily pair each query peak, in m/z order, with the nearest candidate peak
/// within `tolerance` that has not been paired yet. Unpaired peaks of either
/// spectrum are paired with zero.
fn align_peaks(
    query: &[CentroidPeak],
    candidate: &[CentroidPeak],
    tolerance: f64,
    paired: &mut Vec<bool>,
    a: &mut Vec<f64>,
    b: &mut Vec<f64>,
) {
    paired.clear();
    paired.resize(candidate.len(), false);
    for q in query.iter() {
        let mut best: Option<(usize, f64)> = None;
        let start = candidate.partition_point(|c| c.mz < q.mz - tolerance);
        for (idx, c) in candidate.iter().enumerate().skip(start) {
            if c.mz > q.mz + tolerance {
                break;
            }
            if paired[idx] {
                continue;
            }
            let err = (c.mz - q.mz).abs();
            if err <= tolerance && best.map_or(true, |(_, best_err)| err < best_err) {
                best = Some((idx, err));
            }
        }
        a.push(q.intensity as f64);
        match best {
            Some((idx, _)) => {
                paired[idx] = true;
                b.push(candidate[idx].intensity as f64);
            }
            None => b.push(0.0),
        }
    }
    for (idx, c) in candidate.iter().enumerate() {
        if !paired[idx] {
            a.push(0.0);
            b.push(c.intensity as f64);
        }
    }
}

fn shift_peaks(peaks: &[CentroidPeak], delta: f64) -> Vec<CentroidPeak> {
    peaks
        .iter()
        .enumerate()
        .map(|(i, p)| CentroidPeak::new(p.mz + delta, p.intensity, i as u32))
        .collect()
}

/// Holds a [`Vectorization`] and [`Transformation`] pair together with the
/// prepared query encoding and the buffers candidates are aligned into.
///
/// [`Vectorizer::release`] drops all of this per-query state so the same
/// instance can be reused for the next query.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    vectorization: Vectorization,
    transformation: Transformation,
    query: Option<SpectrumVector>,
    query_buffer: Vec<f64>,
    candidate_buffer: Vec<f64>,
    paired: Vec<bool>,
}

impl Vectorizer {
    pub fn new(vectorization: Vectorization, transformation: Transformation) -> Self {
        Self {
            vectorization,
            transformation,
            query: None,
            query_buffer: Vec::new(),
            candidate_buffer: Vec::new(),
            paired: Vec::new(),
        }
    }

    pub fn vectorization(&self) -> &Vectorization {
        &self.vectorization
    }

    pub fn transformation(&self) -> Transformation {
        self.transformation
    }

    pub fn vectorize(&self, peaks: &[CentroidPeak]) -> SpectrumVector {
        self.vectorization.vectorize(peaks, self.transformation)
    }

    /// Encode and store the query spectrum, replacing any previous one
    pub fn prepare(&mut self, peaks: &[CentroidPeak]) {
        self.query = Some(self.vectorize(peaks));
    }

    pub fn is_prepared(&self) -> bool {
        self.query.is_some()
    }

    pub fn query(&self) -> Option<&SpectrumVector> {
        self.query.as_ref()
    }

    /// Align the prepared query with `candidate` into two equal length vectors.
    ///
    /// Without a prepared query the candidate is aligned against an empty spectrum.
    pub fn align(&mut self, candidate: &SpectrumVector, shift: Shift) -> (&[f64], &[f64]) {
        self.query_buffer.clear();
        self.candidate_buffer.clear();

        let empty;
        let query = match &self.query {
            Some(query) => query,
            None => {
                empty = self.vectorization.empty_vector();
                &empty
            }
        };

        match (query, candidate) {
            (SpectrumVector::Binned(q), SpectrumVector::Binned(c)) => {
                align_binned(q, c, shift.bins, &mut self.query_buffer, &mut self.candidate_buffer);
            }
            (SpectrumVector::Peaks(q), SpectrumVector::Peaks(c)) => {
                let tolerance = match self.vectorization {
                    Vectorization::PeakMatching { tolerance } => tolerance,
                    _ => 0.0,
                };
                if shift.mz != 0.0 {
                    let shifted = shift_peaks(c, shift.mz);
                    align_peaks(
                        q,
                        &shifted,
                        tolerance,
                        &mut self.paired,
                        &mut self.query_buffer,
                        &mut self.candidate_buffer,
                    );
                } else {
                    align_peaks(
                        q,
                        c,
                        tolerance,
                        &mut self.paired,
                        &mut self.query_buffer,
                        &mut self.candidate_buffer,
                    );
                }
            }
            _ => {
                warn!(
                    "Cannot align spectra encoded by different vectorizations, expected {}",
                    self.vectorization
                );
            }
        }
        (&self.query_buffer, &self.candidate_buffer)
    }

    /// Drop the prepared query and free the alignment buffers. Safe to call at
    /// any time, including before anything was prepared.
    pub fn release(&mut self) {
        self.query = None;
        self.query_buffer = Vec::new();
        self.candidate_buffer = Vec::new();
        self.paired = Vec::new();
    }

    /// Capacity currently held by the alignment buffers
    pub fn buffer_capacity(&self) -> usize {
        self.query_buffer.capacity() + self.candidate_buffer.capacity() + self.paired.capacity()
    }
}
