//! Search settings and the enumerated algorithm choices they select.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::transform::Transformation;
use crate::vectorize::{ProfileShape, Vectorization};

/// The narrowest bin width a binned vectorization accepts
pub const MIN_BIN_WIDTH: f64 = 1e-3;

/// The most bins a single peak profile may spread over
pub const MAX_PROFILE_BINS: f64 = 1000.0;

/// Errors that reject a [`SpecSimSettings`] before any search work starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Unknown vectorization method index {0}")]
    UnknownVectorization(i32),
    #[error("Unknown transformation method index {0}")]
    UnknownTransformation(i32),
    #[error("Unknown comparator method index {0}")]
    UnknownComparator(i32),
    #[error("Unknown profile shape index {0}")]
    UnknownProfileShape(i32),
    #[error("Unrecognized {kind} name {name:?}")]
    UnknownName { kind: &'static str, name: String },
    #[error("Precursor tolerance must be a finite, non-negative number, got {0}")]
    InvalidTolerance(f64),
    #[error("Bin width must be a finite, positive number, got {0}")]
    InvalidBinWidth(f64),
    #[error("Bin shift must be finite, got {0}")]
    InvalidBinShift(f64),
    #[error("Bin width must be at least {min}, got {0}", min = MIN_BIN_WIDTH)]
    BinWidthTooSmall(f64),
    #[error("Profile base width must be a finite, positive number, got {0}")]
    InvalidBaseWidth(f64),
    #[error(
        "A profile of base width {base_width} spans more than {max} bins of width {bin_width}",
        max = MAX_PROFILE_BINS
    )]
    ProfileTooWide { base_width: f64, bin_width: f64 },
    #[error("The number of peaks to pick must be at least 1")]
    InvalidPickCount,
    #[error("Score threshold must not be NaN")]
    InvalidThreshold,
}

macro_rules! indexed_kind {
    ($name:ident, $label:literal, $err:ident, [$($variant:ident = $idx:literal: $($alias:literal)|+),+ $(,)?]) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The integer index this kind is selected by
            pub fn index(&self) -> i32 {
                match self {
                    $($name::$variant => $idx,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => [$($alias),+][0],)+
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = ConfigurationError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($idx => Ok($name::$variant),)+
                    _ => Err(ConfigurationError::$err(value)),
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfigurationError;

            /// Accepts either the integer index or one of the kind's names, ignoring case
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if let Ok(index) = s.parse::<i32>() {
                    return Self::try_from(index);
                }
                let lowered = s.to_ascii_lowercase();
                match lowered.as_str() {
                    $($($alias)|+ => Ok($name::$variant),)+
                    _ => Err(ConfigurationError::UnknownName {
                        kind: $label,
                        name: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VectorizationKind {
    PeakMatching,
    #[default]
    DirectBinning,
    Profiling,
}

indexed_kind!(VectorizationKind, "vectorization", UnknownVectorization, [
    PeakMatching = 0: "peak-matching" | "peakmatching" | "peaks",
    DirectBinning = 1: "direct-binning" | "directbinning" | "binning",
    Profiling = 2: "profiling" | "profile",
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransformationKind {
    #[default]
    None,
    Sqrt,
    Log,
}

indexed_kind!(TransformationKind, "transformation", UnknownTransformation, [
    None = 0: "none" | "identity",
    Sqrt = 1: "sqrt",
    Log = 2: "log" | "ln",
]);

impl From<TransformationKind> for Transformation {
    fn from(value: TransformationKind) -> Self {
        match value {
            TransformationKind::None => Transformation::None,
            TransformationKind::Sqrt => Transformation::Sqrt,
            TransformationKind::Log => Transformation::Log,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ComparatorKind {
    Euclidean,
    #[default]
    NormalizedDotProduct,
    Pearson,
    CrossCorrelation,
}

indexed_kind!(ComparatorKind, "comparator", UnknownComparator, [
    Euclidean = 0: "euclidean" | "euclidean-distance",
    NormalizedDotProduct = 1: "dot-product" | "normalized-dot-product" | "cosine" | "ndp",
    Pearson = 2: "pearson" | "pearson-correlation",
    CrossCorrelation = 3: "cross-correlation" | "xcorr",
]);

/// All parameters of a spectral similarity search.
///
/// Settings are checked by [`SpecSimSettings::validate`] before a search starts and
/// stay fixed for the whole run, so every score in a result list was computed the
/// same way.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpecSimSettings {
    /// Absolute precursor m/z tolerance
    pub tol_mz: f64,
    /// Number of most intense query peaks to compare with
    pub pick_count: usize,
    /// Minimum similarity for a pair to be reported
    pub thresh_score: f64,
    pub vectorization: VectorizationKind,
    pub transformation: TransformationKind,
    pub comparator: ComparatorKind,
    pub bin_width: f64,
    pub bin_shift: f64,
    /// Selects the [`ProfileShape`] used by profiling vectorization
    pub profile_index: i32,
    pub base_width: f64,
    /// Half-width of the cross-correlation lag window, in bins
    pub xcorr_offset: usize,
    /// Scope passed on to the candidate store
    pub experiment_id: u64,
}

impl Default for SpecSimSettings {
    fn default() -> Self {
        Self {
            tol_mz: 0.5,
            pick_count: 20,
            thresh_score: 0.5,
            vectorization: VectorizationKind::default(),
            transformation: TransformationKind::default(),
            comparator: ComparatorKind::default(),
            bin_width: 1.0,
            bin_shift: 0.0,
            profile_index: 0,
            base_width: 1.0,
            xcorr_offset: 0,
            experiment_id: 0,
        }
    }
}

impl SpecSimSettings {
    pub fn with_tol_mz(mut self, tol_mz: f64) -> Self {
        self.tol_mz = tol_mz;
        self
    }

    pub fn with_pick_count(mut self, pick_count: usize) -> Self {
        self.pick_count = pick_count;
        self
    }

    pub fn with_thresh_score(mut self, thresh_score: f64) -> Self {
        self.thresh_score = thresh_score;
        self
    }

    pub fn with_vectorization(mut self, vectorization: VectorizationKind) -> Self {
        self.vectorization = vectorization;
        self
    }

    pub fn with_transformation(mut self, transformation: TransformationKind) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_comparator(mut self, comparator: ComparatorKind) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_binning(mut self, bin_width: f64, bin_shift: f64) -> Self {
        self.bin_width = bin_width;
        self.bin_shift = bin_shift;
        self
    }

    pub fn with_profile(mut self, profile_index: i32, base_width: f64) -> Self {
        self.profile_index = profile_index;
        self.base_width = base_width;
        self
    }

    pub fn with_xcorr_offset(mut self, xcorr_offset: usize) -> Self {
        self.xcorr_offset = xcorr_offset;
        self
    }

    pub fn with_experiment_id(mut self, experiment_id: u64) -> Self {
        self.experiment_id = experiment_id;
        self
    }

    /// Set the algorithm kinds from their integer indices, failing on any
    /// index that does not name a method.
    pub fn with_method_indices(
        self,
        vectorization: i32,
        transformation: i32,
        comparator: i32,
    ) -> Result<Self, ConfigurationError> {
        Ok(self
            .with_vectorization(vectorization.try_into()?)
            .with_transformation(transformation.try_into()?)
            .with_comparator(comparator.try_into()?))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.tol_mz.is_finite() || self.tol_mz < 0.0 {
            return Err(ConfigurationError::InvalidTolerance(self.tol_mz));
        }
        if !self.bin_width.is_finite() || self.bin_width <= 0.0 {
            return Err(ConfigurationError::InvalidBinWidth(self.bin_width));
        }
        if !matches!(self.vectorization, VectorizationKind::PeakMatching)
            && self.bin_width < MIN_BIN_WIDTH
        {
            return Err(ConfigurationError::BinWidthTooSmall(self.bin_width));
        }
        if !self.bin_shift.is_finite() {
            return Err(ConfigurationError::InvalidBinShift(self.bin_shift));
        }
        if self.pick_count == 0 {
            return Err(ConfigurationError::InvalidPickCount);
        }
        if self.thresh_score.is_nan() {
            return Err(ConfigurationError::InvalidThreshold);
        }
        ProfileShape::try_from(self.profile_index)?;
        if matches!(self.vectorization, VectorizationKind::Profiling)
            && (!self.base_width.is_finite() || self.base_width <= 0.0)
        {
            return Err(ConfigurationError::InvalidBaseWidth(self.base_width));
        }
        if matches!(self.vectorization, VectorizationKind::Profiling)
            && self.base_width / self.bin_width > MAX_PROFILE_BINS
        {
            return Err(ConfigurationError::ProfileTooWide {
                base_width: self.base_width,
                bin_width: self.bin_width,
            });
        }
        Ok(())
    }

    /// Build the [`Vectorization`] these settings describe
    pub fn build_vectorization(&self) -> Result<Vectorization, ConfigurationError> {
        let vectorization = match self.vectorization {
            VectorizationKind::PeakMatching => Vectorization::peak_matching(self.bin_width),
            VectorizationKind::DirectBinning => {
                Vectorization::direct_binning(self.bin_width, self.bin_shift)
            }
            VectorizationKind::Profiling => Vectorization::profiling(
                self.bin_width,
                self.bin_shift,
                ProfileShape::try_from(self.profile_index)?,
                self.base_width,
            ),
        };
        Ok(vectorization)
    }

    #[cfg(feature = "serde")]
    pub fn from_json<R: std::io::Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind_indices() {
        for kind in VectorizationKind::ALL {
            assert_eq!(VectorizationKind::try_from(kind.index()).unwrap(), *kind);
        }
        for kind in ComparatorKind::ALL {
            assert_eq!(ComparatorKind::try_from(kind.index()).unwrap(), *kind);
        }
        assert_eq!(
            VectorizationKind::try_from(3),
            Err(ConfigurationError::UnknownVectorization(3))
        );
        assert_eq!(
            TransformationKind::try_from(-1),
            Err(ConfigurationError::UnknownTransformation(-1))
        );
        assert_eq!(
            ComparatorKind::try_from(4),
            Err(ConfigurationError::UnknownComparator(4))
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("XCorr".parse::<ComparatorKind>().unwrap(), ComparatorKind::CrossCorrelation);
        assert_eq!("2".parse::<ComparatorKind>().unwrap(), ComparatorKind::Pearson);
        assert_eq!("profiling".parse::<VectorizationKind>().unwrap(), VectorizationKind::Profiling);
        assert_eq!(" sqrt ".parse::<TransformationKind>().unwrap(), TransformationKind::Sqrt);
        assert_eq!(ComparatorKind::NormalizedDotProduct.to_string(), "dot-product");
        assert!(matches!(
            "manhattan".parse::<ComparatorKind>(),
            Err(ConfigurationError::UnknownName { kind: "comparator", .. })
        ));
        assert_eq!(
            "7".parse::<TransformationKind>(),
            Err(ConfigurationError::UnknownTransformation(7))
        );
    }

    #[test]
    fn test_method_indices() {
        let settings = SpecSimSettings::default()
            .with_method_indices(2, 1, 3)
            .unwrap();
        assert_eq!(settings.vectorization, VectorizationKind::Profiling);
        assert_eq!(settings.transformation, TransformationKind::Sqrt);
        assert_eq!(settings.comparator, ComparatorKind::CrossCorrelation);

        let err = SpecSimSettings::default().with_method_indices(0, 0, 9);
        assert_eq!(err, Err(ConfigurationError::UnknownComparator(9)));
    }

    #[test]
    fn test_validate() {
        assert!(SpecSimSettings::default().validate().is_ok());
        assert_eq!(
            SpecSimSettings::default().with_tol_mz(-0.1).validate(),
            Err(ConfigurationError::InvalidTolerance(-0.1))
        );
        assert_eq!(
            SpecSimSettings::default().with_binning(0.0, 0.0).validate(),
            Err(ConfigurationError::InvalidBinWidth(0.0))
        );
        assert_eq!(
            SpecSimSettings::default().with_pick_count(0).validate(),
            Err(ConfigurationError::InvalidPickCount)
        );
        assert_eq!(
            SpecSimSettings::default().with_thresh_score(f64::NAN).validate(),
            Err(ConfigurationError::InvalidThreshold)
        );
        assert_eq!(
            SpecSimSettings::default().with_profile(5, 1.0).validate(),
            Err(ConfigurationError::UnknownProfileShape(5))
        );
        assert_eq!(
            SpecSimSettings::default()
                .with_vectorization(VectorizationKind::Profiling)
                .with_profile(1, -2.0)
                .validate(),
            Err(ConfigurationError::InvalidBaseWidth(-2.0))
        );
    }

    #[test]
    fn test_validate_bin_count() {
        assert_eq!(
            SpecSimSettings::default().with_binning(1e-16, 0.0).validate(),
            Err(ConfigurationError::BinWidthTooSmall(1e-16))
        );
        assert!(SpecSimSettings::default()
            .with_vectorization(VectorizationKind::PeakMatching)
            .with_binning(1e-4, 0.0)
            .validate()
            .is_ok());
        assert!(SpecSimSettings::default()
            .with_binning(MIN_BIN_WIDTH, 0.0)
            .validate()
            .is_ok());

        let profile = SpecSimSettings::default()
            .with_vectorization(VectorizationKind::Profiling)
            .with_binning(0.01, 0.0);
        assert!(profile.clone().with_profile(0, 5.0).validate().is_ok());
        assert_eq!(
            profile.with_profile(0, 100.0).validate(),
            Err(ConfigurationError::ProfileTooWide {
                base_width: 100.0,
                bin_width: 0.01
            })
        );
    }

    #[test]
    fn test_build_vectorization() {
        let settings = SpecSimSettings::default()
            .with_vectorization(VectorizationKind::Profiling)
            .with_binning(0.5, 0.25)
            .with_profile(1, 2.0);
        assert_eq!(
            settings.build_vectorization().unwrap(),
            Vectorization::profiling(0.5, 0.25, ProfileShape::Gaussian, 2.0)
        );
        let settings = settings.with_vectorization(VectorizationKind::PeakMatching);
        assert_eq!(
            settings.build_vectorization().unwrap(),
            Vectorization::peak_matching(0.5)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let text = r#"{"tol_mz": 1.5, "comparator": "Pearson", "pick_count": 5}"#;
        let settings = SpecSimSettings::from_json(text.as_bytes()).unwrap();
        assert_eq!(settings.tol_mz, 1.5);
        assert_eq!(settings.comparator, ComparatorKind::Pearson);
        assert_eq!(settings.pick_count, 5);
        assert_eq!(settings.bin_width, 1.0);
    }
}
