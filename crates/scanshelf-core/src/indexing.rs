//! Batch indexing of capture files.
//!
//! An [`IndexScheme`] turns a list of filenames into ordered [`Batch`]es.
//! [`extend_index`] feeds only not-yet-indexed filenames to a scheme and
//! appends the result after the existing batches, so indexing can be re-run
//! at any time without renumbering anything already recorded.
//!
//! # Capture-serial algorithm
//!
//! 1. Parse `<MMDDYYYYhhmmss>_<serial>`; unparseable names are skipped.
//! 2. Sort by (timestamp, serial).
//! 3. A serial that is not greater than the previous one starts a new batch
//!    (the device counter was reset).
//! 4. A forward jump of more than one produces a warning but keeps the batch.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use tracing::debug;

use crate::capture::{parse_capture_filename, BATCH_DATETIME_FORMAT};
use crate::error::IndexError;
use crate::models::{Batch, BatchIndex};

/// How unindexed filenames are grouped into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScheme {
    /// Device timestamp + serial naming; batches split on serial resets.
    CaptureSerial,
    /// No reliable convention: one batch in lexicographic order.
    SingleBatch,
}

impl FromStr for IndexScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture-serial" => Ok(IndexScheme::CaptureSerial),
            "single-batch" => Ok(IndexScheme::SingleBatch),
            other => Err(format!(
                "unknown indexing scheme '{}': expected capture-serial or single-batch",
                other
            )),
        }
    }
}

/// Batches produced by one scheme run, plus what it could not place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeOutput {
    pub batches: Vec<Batch>,
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

impl IndexScheme {
    pub fn label(&self) -> &'static str {
        match self {
            IndexScheme::CaptureSerial => "capture-serial",
            IndexScheme::SingleBatch => "single-batch",
        }
    }

    /// Group `filenames` into batches numbered from `first_id`.
    pub fn run(&self, filenames: &[String], first_id: u32) -> SchemeOutput {
        match self {
            IndexScheme::CaptureSerial => index_capture_serial(filenames, first_id),
            IndexScheme::SingleBatch => index_single_batch(filenames, first_id),
        }
    }
}

struct OpenBatch {
    files: BTreeMap<u32, String>,
    earliest: NaiveDateTime,
    latest: NaiveDateTime,
}

impl OpenBatch {
    fn start(serial: u32, filename: &str, taken_at: NaiveDateTime) -> Self {
        let mut files = BTreeMap::new();
        files.insert(serial, filename.to_string());
        Self {
            files,
            earliest: taken_at,
            latest: taken_at,
        }
    }

    fn push(&mut self, serial: u32, filename: &str, taken_at: NaiveDateTime) {
        self.files.insert(serial, filename.to_string());
        self.earliest = self.earliest.min(taken_at);
        self.latest = self.latest.max(taken_at);
    }

    fn finish(self, batch_id: u32) -> Batch {
        Batch {
            batch_id,
            start_datetime: self.earliest.format(BATCH_DATETIME_FORMAT).to_string(),
            end_datetime: self.latest.format(BATCH_DATETIME_FORMAT).to_string(),
            files: self.files,
        }
    }
}

fn index_capture_serial(filenames: &[String], first_id: u32) -> SchemeOutput {
    let mut parsed = Vec::with_capacity(filenames.len());
    let mut out = SchemeOutput::default();

    for name in filenames {
        match parse_capture_filename(name) {
            Some(stamp) => parsed.push((stamp.taken_at, stamp.serial, name.as_str())),
            None => {
                debug!(filename = %name, "not a capture filename, skipping");
                out.skipped.push(name.clone());
            }
        }
    }
    parsed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut next_id = first_id;
    let mut current: Option<OpenBatch> = None;
    let mut prev_serial: Option<u32> = None;

    for (taken_at, serial, filename) in parsed {
        let continues = prev_serial.is_some_and(|prev| serial > prev);
        match current.as_mut() {
            Some(open) if continues => {
                let prev = prev_serial.unwrap_or(serial);
                if serial > prev + 1 {
                    out.warnings.push(format!(
                        "Batch {}: serial skip {} -> {} (at {})",
                        next_id, prev, serial, filename
                    ));
                }
                open.push(serial, filename, taken_at);
            }
            Some(_) => {
                if let Some(open) = current.take() {
                    out.batches.push(open.finish(next_id));
                    next_id += 1;
                }
                current = Some(OpenBatch::start(serial, filename, taken_at));
            }
            None => current = Some(OpenBatch::start(serial, filename, taken_at)),
        }
        prev_serial = Some(serial);
    }
    if let Some(open) = current {
        out.batches.push(open.finish(next_id));
    }
    out
}

fn index_single_batch(filenames: &[String], first_id: u32) -> SchemeOutput {
    let mut ordered = filenames.to_vec();
    ordered.sort();
    if ordered.is_empty() {
        return SchemeOutput::default();
    }
    let files = ordered
        .into_iter()
        .enumerate()
        .map(|(i, name)| (i as u32 + 1, name))
        .collect();
    SchemeOutput {
        batches: vec![Batch {
            batch_id: first_id,
            start_datetime: "N/A".to_string(),
            end_datetime: "N/A".to_string(),
            files,
        }],
        skipped: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Result of an incremental indexing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexUpdate {
    /// Existing batches followed by the new ones.
    pub index: BatchIndex,
    pub new_batches: Vec<Batch>,
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

impl IndexUpdate {
    pub fn newly_indexed(&self) -> usize {
        self.new_batches.iter().map(|b| b.files.len()).sum()
    }
}

/// Filenames not present in any existing batch, in input order.
pub fn unindexed_filenames(existing: &BatchIndex, filenames: &[String]) -> Vec<String> {
    let indexed: HashSet<&str> = existing
        .batches
        .iter()
        .flat_map(|b| b.files.values().map(String::as_str))
        .collect();
    filenames
        .iter()
        .filter(|name| !indexed.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Index the filenames that `existing` does not know yet.
///
/// Already-indexed files keep their batch and serial. New batch ids continue
/// after the last existing batch. For the capture-serial scheme, any new
/// capture timestamped before the end of the last existing batch means files
/// were missed earlier; that is reported as [`IndexError::Regression`] and
/// nothing is appended.
pub fn extend_index(
    existing: &BatchIndex,
    filenames: &[String],
    scheme: IndexScheme,
) -> Result<IndexUpdate, IndexError> {
    let pending = unindexed_filenames(existing, filenames);
    let first_id = existing.last().map(|b| b.batch_id + 1).unwrap_or(1);
    let output = scheme.run(&pending, first_id);

    if scheme == IndexScheme::CaptureSerial && !output.batches.is_empty() {
        check_no_regression(existing, &pending)?;
    }

    let mut index = existing.clone();
    index.batches.extend(output.batches.iter().cloned());
    Ok(IndexUpdate {
        index,
        new_batches: output.batches,
        skipped: output.skipped,
        warnings: output.warnings,
    })
}

fn check_no_regression(existing: &BatchIndex, pending: &[String]) -> Result<(), IndexError> {
    let Some(last) = existing.last() else {
        return Ok(());
    };
    let Ok(last_end) = NaiveDateTime::parse_from_str(&last.end_datetime, BATCH_DATETIME_FORMAT)
    else {
        return Ok(());
    };
    let offending: Vec<String> = pending
        .iter()
        .filter(|name| {
            parse_capture_filename(name)
                .map(|stamp| stamp.taken_at < last_end)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(IndexError::Regression {
            last_end: last.end_datetime.clone(),
            offending,
        })
    }
}
