//! Storage abstraction for the archive.
//!
//! The archive has no index database: every accepted document is a data
//! file plus a same-stem JSON sidecar inside a `<year>/<month|undated>`
//! folder, and the tree itself is the source of truth. [`MetadataStore`]
//! hides that layout behind a small query interface so reconciliation and
//! the name workflows never touch paths directly, and so an indexed backend
//! could be swapped in later.
//!
//! All paths are relative to the archive root and use `/` separators.

pub mod memory;

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use crate::capture::file_stem;
use crate::models::{ArchiveEntry, BatchIndex, Decision};
use crate::planner::TakenStems;

/// Pool of captures set aside for a second look.
pub const MARKED_DIR: &str = "marked";
/// Pool of rejected captures.
pub const TOSSED_DIR: &str = "tossed";

/// An accepted document as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    pub record: ArchiveEntry,
    /// Relative path of the sidecar record.
    pub record_path: String,
    /// Relative path of the same-stem data file, if there is one.
    pub data_path: Option<String>,
}

/// A sidecar that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub path: String,
    pub message: String,
}

/// Everything a scan of the archive tree found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveScan {
    /// Filenames in the tossed pool.
    pub tossed: BTreeSet<String>,
    /// Filenames in the marked pool.
    pub marked: BTreeSet<String>,
    /// Accepted documents keyed by original filename.
    pub accepted: BTreeMap<String, ScannedEntry>,
    /// Data files in archive folders that have no same-stem sidecar.
    pub orphans: BTreeSet<String>,
    pub errors: Vec<ScanError>,
}

impl ArchiveScan {
    /// Original filenames already placed somewhere in the archive.
    pub fn organized_filenames(&self) -> BTreeSet<String> {
        self.tossed
            .iter()
            .chain(self.marked.iter())
            .chain(self.accepted.keys())
            .cloned()
            .collect()
    }

    /// Occupied stems per folder: sidecars (including unparseable ones) and
    /// orphan data files.
    pub fn taken_stems(&self) -> TakenStems {
        let mut taken = TakenStems::new();
        let paths = self
            .accepted
            .values()
            .map(|e| e.record_path.as_str())
            .chain(self.errors.iter().map(|e| e.path.as_str()))
            .chain(self.orphans.iter().map(String::as_str));
        for path in paths {
            let (folder, name) = split_folder(path);
            taken
                .entry(folder.to_string())
                .or_default()
                .insert(file_stem(name).to_string());
        }
        taken
    }

    /// Recorded decisions of accepted documents, keyed by filename.
    pub fn decisions(&self) -> BTreeMap<String, Decision> {
        self.accepted
            .iter()
            .filter_map(|(name, e)| e.record.review.clone().map(|d| (name.clone(), d)))
            .collect()
    }
}

/// Files found in one `<year>/<month>` folder.
#[derive(Debug, Default)]
pub struct FolderListing {
    /// Folder path relative to the archive root (`"2024/03"`).
    pub folder: String,
    /// Names of non-sidecar files.
    pub data_files: Vec<String>,
    /// Sidecar names with their parsed contents or a parse error message.
    pub records: Vec<(String, Result<ArchiveEntry, String>)>,
}

/// Pair data files with their sidecars and build an [`ArchiveScan`].
///
/// Shared by every store implementation so pairing rules stay identical.
pub fn assemble_scan(
    mut folders: Vec<FolderListing>,
    tossed: BTreeSet<String>,
    marked: BTreeSet<String>,
) -> ArchiveScan {
    folders.sort_by(|a, b| a.folder.cmp(&b.folder));
    let mut scan = ArchiveScan {
        tossed,
        marked,
        ..ArchiveScan::default()
    };

    for mut listing in folders {
        listing.records.sort_by(|a, b| a.0.cmp(&b.0));
        let data_by_stem: HashMap<&str, &str> = listing
            .data_files
            .iter()
            .map(|name| (file_stem(name), name.as_str()))
            .collect();

        let mut paired = BTreeSet::new();
        for (record_name, parsed) in &listing.records {
            let record_path = format!("{}/{}", listing.folder, record_name);
            let stem = file_stem(record_name);
            paired.insert(stem);
            let record = match parsed {
                Ok(record) => record.clone(),
                Err(message) => {
                    warn!(path = %record_path, error = %message, "malformed sidecar record");
                    scan.errors.push(ScanError {
                        path: record_path,
                        message: message.clone(),
                    });
                    continue;
                }
            };
            if record.original_filename.is_empty() {
                continue;
            }
            let data_path = data_by_stem
                .get(stem)
                .map(|name| format!("{}/{}", listing.folder, name));
            if let Some(previous) = scan.accepted.get(&record.original_filename) {
                warn!(
                    filename = %record.original_filename,
                    first = %previous.record_path,
                    second = %record_path,
                    "document recorded twice; keeping the later record"
                );
            }
            scan.accepted.insert(
                record.original_filename.clone(),
                ScannedEntry {
                    record,
                    record_path,
                    data_path,
                },
            );
        }

        for name in &listing.data_files {
            if !paired.contains(file_stem(name)) {
                scan.orphans.insert(format!("{}/{}", listing.folder, name));
            }
        }
    }
    scan
}

/// True for `<digits>/<digits>` and `<digits>/undated`.
pub fn is_archive_folder(year: &str, month: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(year) && (digits(month) || month == "undated")
}

/// True for names the store treats as sidecar records.
pub fn is_record_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".json")
}

/// Sidecar path for a data file.
///
/// Archive folders use the same stem with a `.json` extension. The pools
/// keep captures under their original names, where `a.jpg` and `a.png` can
/// sit side by side, so pool sidecars append `.json` to the full name.
pub fn sidecar_path_for(path: &str) -> String {
    let (folder, name) = split_folder(path);
    if folder == TOSSED_DIR || folder == MARKED_DIR {
        format!("{}/{}.json", folder, name)
    } else if folder.is_empty() {
        format!("{}.json", file_stem(name))
    } else {
        format!("{}/{}.json", folder, file_stem(name))
    }
}

/// Split a relative path into its folder and final component.
pub fn split_folder(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Abstract backend for sidecar records and archive placement.
///
/// `path` arguments name a document's data file; sidecar paths are derived
/// with [`sidecar_path_for`].
pub trait MetadataStore {
    /// Read the sidecar of a data file. A missing sidecar is `None`.
    fn read(&self, path: &str) -> Result<Option<ArchiveEntry>>;

    /// Write (create or replace) the sidecar of a data file.
    fn write(&self, path: &str, entry: &ArchiveEntry) -> Result<()>;

    /// Remove the sidecar of a data file. A missing sidecar is not an error.
    fn delete(&self, path: &str) -> Result<()>;

    /// Walk the archive and report current placement.
    fn scan(&self) -> Result<ArchiveScan>;

    /// Whether any file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Move one file, creating destination folders. A missing source or an
    /// occupied destination is an error; nothing is overwritten.
    fn relocate(&self, from: &str, to: &str) -> Result<()>;

    /// Create or replace a data file with `bytes`, creating folders.
    fn store_data(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Load `batches.json`; an absent index is empty.
    fn load_index(&self) -> Result<BatchIndex>;

    fn save_index(&self, index: &BatchIndex) -> Result<()>;

    /// Move a data file and then its sidecar (when present) to `to`.
    ///
    /// The two moves are not atomic; a crash in between leaves a sidecar
    /// without its data file, which the reconciler repairs.
    fn move_document(&self, from: &str, to: &str) -> Result<()> {
        self.relocate(from, to)?;
        let from_record = sidecar_path_for(from);
        if self.exists(&from_record) {
            self.relocate(&from_record, &sidecar_path_for(to))?;
        }
        Ok(())
    }
}
