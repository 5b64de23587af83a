//! A streaming reader for [MGF](https://www.matrixscience.com/help/data_file_help.html#GEN) files.
//!
//! Each `BEGIN IONS`/`END IONS` block becomes an [`MgfRecord`], which can be turned into a
//! [`QuerySpectrum`] to search with or a [`Candidate`] to store in a library.
use std::io::{self, prelude::*};

use log::warn;
use mzpeaks::CentroidPeak;
use thiserror::Error;

use crate::peaks::{sorted_peaks, QuerySpectrum};
use crate::store::Candidate;

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum MgfParserState {
    Start,
    FileHeader,
    ScanHeaders,
    Peaks,
    Between,
    Done,
    Error,
}

#[derive(Debug, Error)]
pub enum MgfError {
    #[error("Encountered a malformed peak line: {0}")]
    MalformedPeakLine(String),
    #[error("Encountered a malformed header line: {0}")]
    MalformedHeaderLine(String),
    #[error("Not enough columns for peak line encountered: {0}")]
    NotEnoughColumnsForPeakLine(String),
    #[error("Spectrum {0:?} has no PEPMASS header")]
    MissingPrecursor(String),
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// One `BEGIN IONS` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MgfRecord {
    pub title: String,
    pub precursor_mz: Option<f64>,
    pub precursor_intensity: Option<f32>,
    pub charge: Option<i32>,
    /// The `SCANS` header, when it holds a single integer
    pub scans: Option<u64>,
    /// The `LIBID` header
    pub library_id: Option<u64>,
    /// Any other header, keys lowercased
    pub params: Vec<(String, String)>,
    pub peaks: Vec<CentroidPeak>,
}

impl MgfRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.precursor_mz.is_none() && self.peaks.is_empty()
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn require_precursor(&self) -> Result<f64, MgfError> {
        self.precursor_mz
            .ok_or_else(|| MgfError::MissingPrecursor(self.title.clone()))
    }

    /// Convert into a query spectrum identified by `id`
    pub fn into_query(self, id: u64) -> Result<QuerySpectrum, MgfError> {
        let precursor_mz = self.require_precursor()?;
        Ok(QuerySpectrum::new(
            id,
            self.title,
            precursor_mz,
            self.charge,
            self.peaks,
        ))
    }

    /// Convert into a library candidate, identified by its `LIBID` header, else its
    /// `SCANS` header, else `fallback_id`.
    pub fn into_candidate(self, fallback_id: u64) -> Result<Candidate, MgfError> {
        let precursor_mz = self.require_precursor()?;
        let library_id = self.library_id.or(self.scans).unwrap_or(fallback_id);
        Ok(Candidate::new(library_id, precursor_mz, self.peaks))
    }
}

/// Iterates over the records of an MGF stream.
///
/// Parsing stops at the first error, which is yielded once.
pub struct MgfReader<R: BufRead> {
    handle: R,
    state: MgfParserState,
    line_number: usize,
    error: Option<MgfError>,
}

impl<R: BufRead> MgfReader<R> {
    pub fn new(handle: R) -> Self {
        Self {
            handle,
            state: MgfParserState::Start,
            line_number: 0,
            error: None,
        }
    }

    pub fn state(&self) -> MgfParserState {
        self.state
    }

    /// The number of lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn fail(&mut self, error: MgfError) -> bool {
        self.state = MgfParserState::Error;
        self.error = Some(error);
        false
    }

    fn parse_peak_from_line(&mut self, line: &str, record: &mut MgfRecord) -> Option<bool> {
        let first = line.chars().next()?;
        if !first.is_ascii_digit() {
            return None;
        }
        let mut it = line.split_ascii_whitespace();
        let (mz_token, intensity_token) = match (it.next(), it.next()) {
            (Some(mz), Some(intensity)) => (mz, intensity),
            _ => {
                let line = format!("line {}: {line}", self.line_number);
                return Some(self.fail(MgfError::NotEnoughColumnsForPeakLine(line)));
            }
        };
        match (mz_token.parse::<f64>(), intensity_token.parse::<f32>()) {
            (Ok(mz), Ok(intensity)) => {
                record.peaks.push(CentroidPeak::new(mz, intensity, 0));
                Some(true)
            }
            _ => {
                let line = format!("line {}: {line}", self.line_number);
                Some(self.fail(MgfError::MalformedPeakLine(line)))
            }
        }
    }

    fn parse_charge(&mut self, value: &str) -> Option<i32> {
        let (sign, value, tail_sign) = if let Some(stripped) = value.strip_suffix('+') {
            (1, stripped, true)
        } else if let Some(stripped) = value.strip_suffix('-') {
            (-1, stripped, true)
        } else {
            (1, value, false)
        };

        if tail_sign && (value.starts_with('-') || value.starts_with('+')) {
            self.fail(MgfError::MalformedHeaderLine(format!(
                "Could not parse charge value {value}"
            )));
            return None;
        }

        match value.parse::<i32>() {
            Ok(z) => Some(sign * z),
            Err(e) => {
                self.fail(MgfError::MalformedHeaderLine(format!(
                    "Could not parse charge value {value} : {e}"
                )));
                None
            }
        }
    }

    fn handle_pepmass(&mut self, value: &str, record: &mut MgfRecord) -> bool {
        let mut parts = value.split_ascii_whitespace();
        let mz = match parts.next() {
            Some(s) => s,
            None => {
                return self.fail(MgfError::MalformedHeaderLine(
                    "No m/z value in PEPMASS header".into(),
                ))
            }
        };
        let mz: f64 = match mz.parse() {
            Ok(mz) => mz,
            Err(e) => {
                return self.fail(MgfError::MalformedHeaderLine(format!(
                    "Malformed m/z value in PEPMASS header {value}: {e}"
                )))
            }
        };
        record.precursor_mz = Some(mz);
        record.precursor_intensity = parts.next().and_then(|v| {
            v.parse()
                .map_err(|e| warn!("Failed to parse PEPMASS intensity {value}: {e}"))
                .ok()
        });
        if let Some(c) = parts.next() {
            let charge = self.parse_charge(c);
            if self.state == MgfParserState::Error {
                return false;
            }
            record.charge = charge;
        }
        true
    }

    fn handle_scan_header(&mut self, line: &str, record: &mut MgfRecord) -> bool {
        if let Some(peak_line) = self.parse_peak_from_line(line, record) {
            if peak_line {
                self.state = MgfParserState::Peaks;
            }
            return peak_line;
        }
        if line == "END IONS" {
            self.state = MgfParserState::Between;
            return false;
        }
        let Some((key, value)) = line.split_once('=') else {
            return self.fail(MgfError::MalformedHeaderLine(format!(
                "No '=' in header line {}: {line}",
                self.line_number
            )));
        };
        let value = value.trim();
        match key.trim().to_ascii_uppercase().as_str() {
            "TITLE" => record.title = value.to_string(),
            "PEPMASS" => return self.handle_pepmass(value, record),
            "CHARGE" => {
                // An explicit charge in PEPMASS wins
                let charge = self.parse_charge(value);
                if self.state == MgfParserState::Error {
                    return false;
                }
                if record.charge.is_none() {
                    record.charge = charge;
                }
            }
            "SCANS" => {
                record.scans = value.parse().ok();
                record.params.push(("scans".into(), value.to_string()));
            }
            "LIBID" => match value.parse() {
                Ok(id) => record.library_id = Some(id),
                Err(e) => {
                    return self.fail(MgfError::MalformedHeaderLine(format!(
                        "Could not parse LIBID value {value}: {e}"
                    )))
                }
            },
            _ => record
                .params
                .push((key.trim().to_lowercase(), value.to_string())),
        }
        true
    }

    fn handle_peak(&mut self, line: &str, record: &mut MgfRecord) -> bool {
        match self.parse_peak_from_line(line, record) {
            Some(peak_line) => peak_line,
            None if line == "END IONS" => {
                self.state = MgfParserState::Between;
                false
            }
            None => {
                let line = format!("line {}: {line}", self.line_number);
                self.fail(MgfError::MalformedPeakLine(line))
            }
        }
    }

    /// Skips any `KEY=value` file header lines before the first `BEGIN IONS`
    fn handle_start(&mut self, line: &str) -> bool {
        if line == "BEGIN IONS" {
            self.state = MgfParserState::ScanHeaders;
        } else if line.contains('=') {
            self.state = MgfParserState::FileHeader;
        } else if !line.starts_with('#') {
            warn!("Ignoring unexpected line {} before the first spectrum: {line}", self.line_number);
        }
        true
    }

    fn handle_between(&mut self, line: &str) -> bool {
        if line == "BEGIN IONS" {
            self.state = MgfParserState::ScanHeaders;
        }
        true
    }

    /// Read the next record, `Ok(None)` once the stream is exhausted
    pub fn read_next(&mut self) -> Result<Option<MgfRecord>, MgfError> {
        if matches!(self.state, MgfParserState::Done | MgfParserState::Error) {
            return Ok(None);
        }
        let mut record = MgfRecord::default();
        let mut started = false;
        let mut buffer = String::new();
        loop {
            buffer.clear();
            let b = match self.handle.read_line(&mut buffer) {
                Ok(b) => b,
                Err(err) => {
                    self.state = MgfParserState::Error;
                    return Err(MgfError::IOError(err));
                }
            };
            if b == 0 {
                if started {
                    warn!("Reached the end of the stream inside a spectrum, missing END IONS");
                }
                self.state = MgfParserState::Done;
                break;
            }
            self.line_number += 1;

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            let work = match self.state {
                MgfParserState::Start | MgfParserState::FileHeader => self.handle_start(line),
                MgfParserState::ScanHeaders => {
                    started = true;
                    self.handle_scan_header(line, &mut record)
                }
                MgfParserState::Peaks => self.handle_peak(line, &mut record),
                MgfParserState::Between => self.handle_between(line),
                MgfParserState::Done | MgfParserState::Error => false,
            };

            if self.state == MgfParserState::Error {
                if let Some(err) = self.error.take() {
                    return Err(err);
                }
            }
            if !work && self.state == MgfParserState::Between {
                break;
            }
        }
        if started && !record.is_empty() {
            record.peaks = sorted_peaks(record.peaks);
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

impl<R: BufRead> Iterator for MgfReader<R> {
    type Item = Result<MgfRecord, MgfError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_next() {
                Ok(Some(record)) => return Some(Ok(record)),
                Err(err) => return Some(Err(err)),
                // A block with no content, keep looking
                Ok(None) if self.state == MgfParserState::Between => continue,
                Ok(None) => return None,
            }
        }
    }
}
