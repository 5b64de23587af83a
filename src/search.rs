//! The similarity search engine.
//!
//! A [`SimilaritySearch`] fetches the library candidates for a whole batch of
//! queries in one request, then scores every query against the candidates whose
//! precursor m/z lies within tolerance, keeping the pairs that score at least the
//! configured threshold.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::compare::{Comparator, SpectrumComparator};
use crate::interval::{Interval, IntervalBuilder};
use crate::peaks::QuerySpectrum;
use crate::settings::{ConfigurationError, SpecSimSettings};
use crate::store::{Candidate, CandidateStore, DataAccessError};

/// An accepted (query, library spectrum, score) triple
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectrumMatch {
    pub query_id: u64,
    pub library_id: u64,
    pub score: f64,
}

impl SpectrumMatch {
    pub fn new(query_id: u64, library_id: u64, score: f64) -> Self {
        Self {
            query_id,
            library_id,
            score,
        }
    }
}

impl fmt::Display for SpectrumMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SpectrumMatch({} -> {}, {:.4})",
            self.query_id, self.library_id, self.score
        )
    }
}

/// Counters describing the work done by one search
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchStats {
    /// Queries whose candidate loop ran to completion
    pub queries: usize,
    /// Candidates returned by the store for the batch
    pub candidates: usize,
    /// Pairs scored by the comparator
    pub compared: usize,
    /// Pairs inside the coarse precursor window that failed the exact tolerance check
    pub rejected_by_precursor: usize,
    /// Comparisons that resolved to the minimum similarity
    pub degenerate: usize,
    pub matches: usize,
    pub cancelled: bool,
}

impl SearchStats {
    /// Accumulate the per-query counters of `other`
    pub fn merge(&mut self, other: &SearchStats) {
        self.queries += other.queries;
        self.compared += other.compared;
        self.rejected_by_precursor += other.rejected_by_precursor;
        self.degenerate += other.degenerate;
        self.matches += other.matches;
        self.cancelled |= other.cancelled;
    }
}

impl fmt::Display for SearchStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} queries, {} candidates, {} comparisons ({} degenerate), {} rejected by precursor, {} matches",
            self.queries,
            self.candidates,
            self.compared,
            self.degenerate,
            self.rejected_by_precursor,
            self.matches
        )?;
        if self.cancelled {
            f.write_str(", cancelled")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<SpectrumMatch>,
    pub stats: SearchStats,
}

/// The reasons a search run fails. No partial results are returned with them.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search configuration: {0}")]
    Configuration(
        #[from]
        #[source]
        ConfigurationError,
    ),
    #[error("Failed to retrieve candidates: {0}")]
    DataAccess(
        #[from]
        #[source]
        DataAccessError,
    ),
}

/// The exact per-pair precursor check, exclusive at the tolerance
#[inline]
pub fn within_precursor_tolerance(query_mz: f64, candidate_mz: f64, tolerance: f64) -> bool {
    (query_mz - candidate_mz).abs() < tolerance
}

/// Candidate positions ordered by precursor m/z, so each query only visits the
/// candidates near its own precursor.
#[derive(Debug)]
struct CandidateIndex<'a> {
    candidates: &'a [Candidate],
    by_precursor: Vec<usize>,
}

impl<'a> CandidateIndex<'a> {
    fn new(candidates: &'a [Candidate]) -> Self {
        let mut by_precursor: Vec<usize> = (0..candidates.len())
            .filter(|i| candidates[*i].precursor_mz.is_finite())
            .collect();
        by_precursor.sort_by(|a, b| {
            candidates[*a]
                .precursor_mz
                .total_cmp(&candidates[*b].precursor_mz)
        });
        Self {
            candidates,
            by_precursor,
        }
    }

    /// Positions of the candidates in the closed window around `precursor_mz`, in
    /// the order the store returned them
    fn window(&self, precursor_mz: f64, tolerance: f64, positions: &mut Vec<usize>) {
        positions.clear();
        let lo = precursor_mz - tolerance;
        let hi = precursor_mz + tolerance;
        let start = self
            .by_precursor
            .partition_point(|i| self.candidates[*i].precursor_mz < lo);
        let end = self
            .by_precursor
            .partition_point(|i| self.candidates[*i].precursor_mz <= hi);
        if start < end {
            positions.extend_from_slice(&self.by_precursor[start..end]);
            positions.sort_unstable();
        }
    }
}

/// A configured similarity search.
///
/// The configuration is validated once on construction and cannot change
/// afterwards, so every score of a run is computed by the same vectorization,
/// transformation and comparator.
#[derive(Debug, Clone)]
pub struct SimilaritySearch {
    settings: SpecSimSettings,
    comparator: Comparator,
    cancel: Option<Arc<AtomicBool>>,
}

impl SimilaritySearch {
    pub fn new(settings: SpecSimSettings) -> Result<Self, ConfigurationError> {
        let comparator = Comparator::from_settings(&settings)?;
        Ok(Self {
            settings,
            comparator,
            cancel: None,
        })
    }

    /// Stop between queries once `flag` is raised, returning the matches found so far
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn settings(&self) -> &SpecSimSettings {
        &self.settings
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// The merged precursor windows of `queries`
    pub fn intervals(&self, queries: &[QuerySpectrum]) -> Vec<Interval> {
        IntervalBuilder::new(self.settings.tol_mz).build(queries.iter().map(|q| q.precursor_mz))
    }

    fn fetch<S: CandidateStore>(
        &self,
        queries: &[QuerySpectrum],
        store: &mut S,
    ) -> Result<Vec<Candidate>, DataAccessError> {
        let intervals = self.intervals(queries);
        if intervals.is_empty() {
            return Ok(Vec::new());
        }
        store.get_candidates(&intervals, self.settings.experiment_id)
    }

    /// Search every query and return the accepted matches, ordered by query and then
    /// by the order the store returned the candidates in.
    pub fn run<S: CandidateStore>(
        &self,
        queries: &[QuerySpectrum],
        store: S,
    ) -> Result<Vec<SpectrumMatch>, SearchError> {
        self.search(queries, store).map(|outcome| outcome.matches)
    }

    /// Like [`SimilaritySearch::run`], also reporting [`SearchStats`]
    pub fn search<S: CandidateStore>(
        &self,
        queries: &[QuerySpectrum],
        mut store: S,
    ) -> Result<SearchOutcome, SearchError> {
        let candidates = self.fetch(queries, &mut store)?;
        let index = CandidateIndex::new(&candidates);
        let mut comparator = self.comparator.clone();

        let mut outcome = SearchOutcome::default();
        outcome.stats.candidates = candidates.len();
        for query in queries {
            if self.is_cancelled() {
                warn!(
                    "Search cancelled after {} of {} queries",
                    outcome.stats.queries,
                    queries.len()
                );
                outcome.stats.cancelled = true;
                break;
            }
            let stats = self.search_query(&mut comparator, query, &index, &mut outcome.matches);
            outcome.stats.merge(&stats);
        }
        info!("Searched with {}: {}", self.comparator.kind(), outcome.stats);
        Ok(outcome)
    }

    /// Search queries in parallel, each worker scoring with its own comparator.
    ///
    /// The matches are in the same order as [`SimilaritySearch::search`] returns
    /// them. On cancellation only the queries before the first skipped one are
    /// kept, so the result covers a prefix of `queries` as it does sequentially.
    #[cfg(feature = "parallelism")]
    pub fn search_parallel<S: CandidateStore>(
        &self,
        queries: &[QuerySpectrum],
        mut store: S,
    ) -> Result<SearchOutcome, SearchError> {
        let candidates = self.fetch(queries, &mut store)?;
        let index = CandidateIndex::new(&candidates);

        let per_query: Vec<Option<(Vec<SpectrumMatch>, SearchStats)>> = queries
            .par_iter()
            .map_init(
                || self.comparator.clone(),
                |comparator, query| {
                    if self.is_cancelled() {
                        return None;
                    }
                    let mut matches = Vec::new();
                    let stats = self.search_query(comparator, query, &index, &mut matches);
                    Some((matches, stats))
                },
            )
            .collect();

        let mut outcome = merge_completed_prefix(per_query);
        outcome.stats.candidates = candidates.len();
        if outcome.stats.cancelled {
            warn!(
                "Search cancelled after {} of {} queries",
                outcome.stats.queries,
                queries.len()
            );
        }
        info!("Searched with {}: {}", self.comparator.kind(), outcome.stats);
        Ok(outcome)
    }

    fn search_query(
        &self,
        comparator: &mut Comparator,
        query: &QuerySpectrum,
        index: &CandidateIndex,
        matches: &mut Vec<SpectrumMatch>,
    ) -> SearchStats {
        let tolerance = self.settings.tol_mz;
        let mut stats = SearchStats {
            queries: 1,
            ..Default::default()
        };
        let mut positions = Vec::new();
        index.window(query.precursor_mz, tolerance, &mut positions);

        let peaks = query.highest_peaks(self.settings.pick_count);
        let degenerate_before = comparator.degenerate_count();
        {
            let mut session = comparator.session(&peaks);
            for candidate in positions.iter().map(|i| &index.candidates[*i]) {
                if !within_precursor_tolerance(query.precursor_mz, candidate.precursor_mz, tolerance) {
                    stats.rejected_by_precursor += 1;
                    continue;
                }
                let score = session.compare_to(&candidate.peaks);
                stats.compared += 1;
                if score >= self.settings.thresh_score {
                    matches.push(SpectrumMatch::new(query.id, candidate.library_id, score));
                    stats.matches += 1;
                }
            }
        }
        stats.degenerate = comparator.degenerate_count() - degenerate_before;
        debug!(
            "{query}: {} of {} nearby candidates passed with threshold {}",
            stats.matches,
            positions.len(),
            self.settings.thresh_score
        );
        stats
    }
}

/// Concatenate per-query results up to the first query that was skipped by
/// cancellation. Queries that finished after it are dropped.
#[cfg(feature = "parallelism")]
fn merge_completed_prefix<I>(per_query: I) -> SearchOutcome
where
    I: IntoIterator<Item = Option<(Vec<SpectrumMatch>, SearchStats)>>,
{
    let mut outcome = SearchOutcome::default();
    for result in per_query {
        match result {
            Some((matches, stats)) => {
                outcome.matches.extend(matches);
                outcome.stats.merge(&stats);
            }
            None => {
                outcome.stats.cancelled = true;
                break;
            }
        }
    }
    outcome
}
