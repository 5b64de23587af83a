//! Precursor m/z windows used to fetch library candidates in a single batch.
use std::fmt;

use log::debug;

/// A half-open precursor m/z range `[left, right)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    left: f64,
    right: f64,
}

impl Interval {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// The smallest half-open interval containing the closed window
    /// `[value - tolerance, value + tolerance]`, with the lower bound clamped at
    /// zero since masses are non-negative.
    pub fn around(value: f64, tolerance: f64) -> Self {
        Self::new((value - tolerance).max(0.0), next_up(value + tolerance))
    }

    #[inline]
    pub fn left(&self) -> f64 {
        self.left
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.right
    }

    pub(crate) fn set_right(&mut self, right: f64) {
        self.right = right;
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.left <= value && value < self.right
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.left < other.right && other.left < self.right
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.left, self.right)
    }
}

/// The least `f64` greater than `x`
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Merges per-query tolerance windows into the minimal list of sorted,
/// non-overlapping [`Interval`]s covering all of them.
#[derive(Debug, Clone, Copy)]
pub struct IntervalBuilder {
    pub tolerance: f64,
}

impl IntervalBuilder {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Build intervals from precursor m/z values in any order. Non-finite values
    /// cannot fall inside any window and are skipped.
    pub fn build<I: IntoIterator<Item = f64>>(&self, values: I) -> Vec<Interval> {
        let mut values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        self.build_sorted(&values)
    }

    /// Build intervals from values already sorted in ascending order.
    pub fn build_sorted(&self, values: &[f64]) -> Vec<Interval> {
        let mut intervals: Vec<Interval> = Vec::new();
        for &value in values {
            match intervals.last_mut() {
                Some(current) if value - self.tolerance < current.right() => {
                    current.set_right(next_up(value + self.tolerance));
                }
                _ => {
                    intervals.push(Interval::around(value, self.tolerance));
                }
            }
        }
        debug!(
            "Merged {} precursor windows into {} intervals",
            values.len(),
            intervals.len()
        );
        intervals
    }
}

/// Shorthand for [`IntervalBuilder::build`]
pub fn build_intervals(values: &[f64], tolerance: f64) -> Vec<Interval> {
    IntervalBuilder::new(tolerance).build(values.iter().copied())
}
