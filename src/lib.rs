//! `mzspecsim` annotates query mass spectra by comparing them to a library of
//! previously identified spectra.
//!
//! A search first merges the precursor m/z tolerance windows of a batch of
//! queries into [`Interval`]s and fetches the library [`Candidate`]s inside them
//! from a [`CandidateStore`] in a single request. Every query then prepares a
//! [`SpectrumComparator`] with its most intense peaks and scores the candidates
//! with a close enough precursor, keeping those that reach the score threshold.
//!
//! ```no_run
//! use mzspecsim::prelude::*;
//!
//! let queries = mzspecsim::io::read_queries("queries.mgf").unwrap();
//! let mut library = SpectralLibrary::new();
//! library.load_mgf(0, "library.mgf").unwrap();
//!
//! let settings = SpecSimSettings::default()
//!     .with_comparator(ComparatorKind::NormalizedDotProduct)
//!     .with_thresh_score(0.7);
//! let search = SimilaritySearch::new(settings).unwrap();
//! for m in search.run(&queries, &mut library).unwrap() {
//!     println!("{m}");
//! }
//! ```
pub mod compare;
pub mod interval;
pub mod io;
pub mod peaks;
pub mod prelude;
pub mod search;
pub mod settings;
pub mod store;
pub mod transform;
pub mod vectorize;

pub use crate::compare::{Comparator, ComparisonSession, SpectrumComparator, MIN_SIMILARITY};
pub use crate::interval::{build_intervals, Interval, IntervalBuilder};
pub use crate::peaks::QuerySpectrum;
pub use crate::search::{
    SearchError, SearchOutcome, SearchStats, SimilaritySearch, SpectrumMatch,
};
pub use crate::settings::{ConfigurationError, SpecSimSettings};
pub use crate::store::{Candidate, CandidateStore, DataAccessError, SpectralLibrary};
pub use crate::transform::Transformation;
pub use crate::vectorize::{Vectorization, Vectorizer};

pub use mzpeaks::CentroidPeak;
