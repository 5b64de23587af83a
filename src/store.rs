//! The candidate store collaborator and an in-memory spectral library implementing it.
use std::fmt;
use std::io;
use std::ops::Range;
use std::path::Path;

use log::{debug, warn};
use mzpeaks::CentroidPeak;
use thiserror::Error;

use crate::interval::Interval;
use crate::io::mgf::{MgfError, MgfReader};
use crate::io::open_path;
use crate::peaks::sorted_peaks;

/// A library spectrum eligible for comparison
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub library_id: u64,
    pub precursor_mz: f64,
    pub peaks: Vec<CentroidPeak>,
}

impl Candidate {
    pub fn new(library_id: u64, precursor_mz: f64, peaks: Vec<CentroidPeak>) -> Self {
        Self {
            library_id,
            precursor_mz,
            peaks: sorted_peaks(peaks),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Candidate({}, {:.4}, <{} Peaks>)",
            self.library_id,
            self.precursor_mz,
            self.peaks.len()
        )
    }
}

/// Failures of a [`CandidateStore`]. These abort a search run.
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("The candidate store is unavailable: {0}")]
    Unavailable(String),
    #[error("Encountered a malformed library record: {0}")]
    MalformedRecord(String),
    #[error("Failed to parse library spectra: {0}")]
    Parse(
        #[from]
        #[source]
        MgfError,
    ),
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// A source of library spectra, queried once per search with every precursor
/// interval of the batch.
pub trait CandidateStore {
    /// Fetch the candidates of `experiment_id` whose precursor m/z falls inside
    /// any of `intervals`. Implementations decide the order, which a search
    /// preserves in its output.
    fn get_candidates(
        &mut self,
        intervals: &[Interval],
        experiment_id: u64,
    ) -> Result<Vec<Candidate>, DataAccessError>;
}

impl<T: CandidateStore + ?Sized> CandidateStore for &mut T {
    fn get_candidates(
        &mut self,
        intervals: &[Interval],
        experiment_id: u64,
    ) -> Result<Vec<Candidate>, DataAccessError> {
        (**self).get_candidates(intervals, experiment_id)
    }
}

impl<T: CandidateStore + ?Sized> CandidateStore for Box<T> {
    fn get_candidates(
        &mut self,
        intervals: &[Interval],
        experiment_id: u64,
    ) -> Result<Vec<Candidate>, DataAccessError> {
        (**self).get_candidates(intervals, experiment_id)
    }
}

#[derive(Debug, Clone)]
struct LibraryEntry {
    experiment_id: u64,
    candidate: Candidate,
}

/// An in-memory library of spectra grouped by experiment.
///
/// Entries are kept ordered by precursor m/z so each interval is answered with
/// a binary search. Entries sharing a precursor m/z keep their insertion order.
#[derive(Debug, Clone)]
pub struct SpectralLibrary {
    entries: Vec<LibraryEntry>,
    sorted: bool,
}

impl SpectralLibrary {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sorted: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a candidate to the library under `experiment_id`.
    ///
    /// A candidate without a finite, non-negative precursor m/z could never be
    /// selected and is rejected.
    pub fn push(&mut self, experiment_id: u64, candidate: Candidate) -> Result<(), DataAccessError> {
        if !candidate.precursor_mz.is_finite() || candidate.precursor_mz < 0.0 {
            return Err(DataAccessError::MalformedRecord(format!(
                "library spectrum {} has precursor m/z {}",
                candidate.library_id, candidate.precursor_mz
            )));
        }
        if let Some(last) = self.entries.last() {
            if last.candidate.precursor_mz > candidate.precursor_mz {
                self.sorted = false;
            }
        }
        self.entries.push(LibraryEntry {
            experiment_id,
            candidate,
        });
        Ok(())
    }

    /// Read every record of an MGF stream into the library under `experiment_id`,
    /// returning the number of spectra added.
    pub fn extend_from_mgf<R: io::BufRead>(
        &mut self,
        experiment_id: u64,
        reader: MgfReader<R>,
    ) -> Result<usize, DataAccessError> {
        let mut count = 0;
        for (ordinal, record) in reader.enumerate() {
            let candidate = record?.into_candidate(ordinal as u64)?;
            self.push(experiment_id, candidate)?;
            count += 1;
        }
        debug!("Loaded {count} library spectra for experiment {experiment_id}");
        Ok(count)
    }

    /// Read an MGF file, gzipped or not, into the library under `experiment_id`
    pub fn load_mgf<P: AsRef<Path>>(
        &mut self,
        experiment_id: u64,
        path: P,
    ) -> Result<usize, DataAccessError> {
        let handle = open_path(path)?;
        self.extend_from_mgf(experiment_id, MgfReader::new(handle))
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.entries
                .sort_by(|a, b| a.candidate.precursor_mz.total_cmp(&b.candidate.precursor_mz));
            self.sorted = true;
        }
    }

    /// The positions of the entries with `left <= precursor m/z < right`
    fn search_interval(&self, interval: &Interval) -> Range<usize> {
        let start = self
            .entries
            .partition_point(|e| e.candidate.precursor_mz < interval.left());
        let end = self
            .entries
            .partition_point(|e| e.candidate.precursor_mz < interval.right());
        start..end.max(start)
    }
}

impl Default for SpectralLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateStore for SpectralLibrary {
    fn get_candidates(
        &mut self,
        intervals: &[Interval],
        experiment_id: u64,
    ) -> Result<Vec<Candidate>, DataAccessError> {
        self.ensure_sorted();
        let mut intervals = intervals.to_vec();
        intervals.sort_by(|a, b| a.left().total_cmp(&b.left()));

        let mut candidates = Vec::new();
        // Everything before `cursor` has been emitted already, so intervals that
        // overlap never emit an entry twice.
        let mut cursor = 0usize;
        for interval in intervals.iter() {
            if interval.left().is_nan() || interval.right().is_nan() {
                warn!("Skipping interval with a NaN bound {interval}");
                continue;
            }
            let hits = self.search_interval(interval);
            let start = hits.start.max(cursor);
            if start >= hits.end {
                continue;
            }
            candidates.extend(
                self.entries[start..hits.end]
                    .iter()
                    .filter(|e| e.experiment_id == experiment_id)
                    .map(|e| e.candidate.clone()),
            );
            cursor = hits.end;
        }
        debug!(
            "Fetched {} candidates from {} intervals for experiment {experiment_id}",
            candidates.len(),
            intervals.len()
        );
        Ok(candidates)
    }
}
