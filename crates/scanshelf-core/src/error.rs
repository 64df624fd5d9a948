//! Domain errors that callers need to tell apart.
//!
//! Everything else is reported through `anyhow::Error`.

use thiserror::Error;

/// Failures of the incremental batch indexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Unindexed captures are timestamped before the end of the last built
    /// batch. Files were missed in an earlier run; the index has to be
    /// rebuilt from scratch.
    #[error(
        "{} unindexed file(s) have timestamps before the last batch's end ({last_end}); \
         delete batches.json and rebuild the index",
        offending.len()
    )]
    Regression {
        last_end: String,
        offending: Vec<String>,
    },
}

/// A review decision that cannot be persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("Receipt requires: {}", missing.join(", "))]
    IncompleteReceipt { missing: Vec<&'static str> },
}

/// Name normalization failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("'{0}' and '{1}' are confirmed different and cannot be merged")]
    DistinctConflict(String, String),

    #[error("merge target must not be empty")]
    EmptyTarget,
}
