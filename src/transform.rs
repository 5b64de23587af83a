//! Elementwise intensity transformations applied before vectorization.
use std::fmt;

/// The smallest intensity the logarithmic transform will take the log of.
/// Intensities at or below it map to `ln(LOG_EPSILON)` rather than `-inf`/`NaN`.
pub const LOG_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transformation {
    #[default]
    None,
    Sqrt,
    /// Natural logarithm, clamped below at [`LOG_EPSILON`].
    ///
    /// Zero stays the value of absent bins and unmatched peaks, so it is
    /// indistinguishable from a peak of intensity 1. Intensities below 1 become
    /// negative, which lets cosine-based scores drop below zero.
    Log,
}

impl Transformation {
    #[inline]
    pub fn apply(&self, intensity: f64) -> f64 {
        match self {
            Self::None => intensity,
            Self::Sqrt => intensity.max(0.0).sqrt(),
            Self::Log => intensity.max(LOG_EPSILON).ln(),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sqrt => write!(f, "sqrt"),
            Self::Log => write!(f, "log"),
        }
    }
}
