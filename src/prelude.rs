//! A set of foundational traits and types used when working with the search engine
pub use crate::compare::SpectrumComparator;
pub use crate::peaks::QuerySpectrum;
pub use crate::search::{SimilaritySearch, SpectrumMatch};
pub use crate::settings::{ComparatorKind, SpecSimSettings, TransformationKind, VectorizationKind};
pub use crate::store::{Candidate, CandidateStore, SpectralLibrary};
