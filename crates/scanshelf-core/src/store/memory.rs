//! In-memory [`MetadataStore`] implementation for tests and embedding.
//!
//! Files are kept as `path → contents` behind `std::sync::RwLock`. Sidecars
//! are stored as their JSON text so malformed records can be simulated.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::models::{ArchiveEntry, BatchIndex};

use super::{
    assemble_scan, is_archive_folder, is_record_name, sidecar_path_for, split_folder,
    ArchiveScan, FolderListing, MetadataStore, MARKED_DIR, TOSSED_DIR,
};

/// In-memory archive tree.
pub struct InMemoryStore {
    files: RwLock<BTreeMap<String, String>>,
    index: RwLock<BatchIndex>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            index: RwLock::new(BatchIndex::default()),
        }
    }

    /// Place a raw file (data or sidecar text) at `path`.
    pub fn put_file(&self, path: &str, contents: &str) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.to_string(), contents.to_string());
        }
    }

    /// All file paths currently stored, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.files.read().ok()?.get(path).cloned()
    }

    /// Remove a single file without touching its sidecar.
    pub fn remove_file(&self, path: &str) -> Option<String> {
        self.files.write().ok()?.remove(path)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for InMemoryStore {
    fn read(&self, path: &str) -> Result<Option<ArchiveEntry>> {
        let record_path = sidecar_path_for(path);
        match self.contents(&record_path) {
            Some(text) => Ok(Some(
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse sidecar: {}", record_path))?,
            )),
            None => Ok(None),
        }
    }

    fn write(&self, path: &str, entry: &ArchiveEntry) -> Result<()> {
        let text = serde_json::to_string_pretty(entry)?;
        self.put_file(&sidecar_path_for(path), &text);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.remove_file(&sidecar_path_for(path));
        Ok(())
    }

    fn scan(&self) -> Result<ArchiveScan> {
        let files = self
            .files
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;

        let mut folders: BTreeMap<String, FolderListing> = BTreeMap::new();
        let mut tossed = BTreeSet::new();
        let mut marked = BTreeSet::new();

        for (path, contents) in files.iter() {
            let (folder, name) = split_folder(path);
            if folder == TOSSED_DIR || folder == MARKED_DIR {
                if !is_record_name(name) {
                    let pool = if folder == TOSSED_DIR { &mut tossed } else { &mut marked };
                    pool.insert(name.to_string());
                }
                continue;
            }
            let mut segments = folder.split('/');
            let archive_folder = match (segments.next(), segments.next(), segments.next()) {
                (Some(year), Some(month), None) => is_archive_folder(year, month),
                _ => false,
            };
            if !archive_folder {
                continue;
            }
            let listing = folders
                .entry(folder.to_string())
                .or_insert_with(|| FolderListing {
                    folder: folder.to_string(),
                    ..FolderListing::default()
                });
            if is_record_name(name) {
                let parsed = serde_json::from_str(contents).map_err(|e| e.to_string());
                listing.records.push((name.to_string(), parsed));
            } else {
                listing.data_files.push(name.to_string());
            }
        }

        Ok(assemble_scan(folders.into_values().collect(), tossed, marked))
    }

    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn relocate(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        if files.contains_key(to) {
            bail!("destination already exists: {}", to);
        }
        let Some(contents) = files.remove(from) else {
            bail!("source file does not exist: {}", from);
        };
        files.insert(to.to_string(), contents);
        Ok(())
    }

    fn store_data(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.put_file(path, &String::from_utf8_lossy(bytes));
        Ok(())
    }

    fn load_index(&self) -> Result<BatchIndex> {
        self.index
            .read()
            .map(|index| index.clone())
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn save_index(&self, index: &BatchIndex) -> Result<()> {
        let mut guard = self
            .index
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        *guard = index.clone();
        Ok(())
    }
}
