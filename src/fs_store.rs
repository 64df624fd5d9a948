//! Filesystem-backed [`MetadataStore`].
//!
//! Rooted at the archive directory. Sidecars are pretty-printed JSON next to
//! their data files; `batches.json` sits at the root. Scanning only walks the
//! two-level `<year>/<month|undated>` folders and the `marked/` and `tossed/`
//! pools; anything else under the root is ignored.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use scanshelf_core::models::{ArchiveEntry, BatchIndex};
use scanshelf_core::store::{
    assemble_scan, is_archive_folder, is_record_name, sidecar_path_for, ArchiveScan,
    FolderListing, MetadataStore, MARKED_DIR, TOSSED_DIR,
};

/// Index of batches, relative to the archive root.
pub const INDEX_FILE: &str = "batches.json";

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a `/`-separated relative path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn list_pool(&self, pool: &str) -> Result<BTreeSet<String>> {
        let dir = self.root.join(pool);
        let mut names = BTreeSet::new();
        if !dir.is_dir() {
            return Ok(names);
        }
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_record_name(&name) {
                names.insert(name);
            }
        }
        Ok(names)
    }
}

fn write_json_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

impl MetadataStore for FsStore {
    fn read(&self, path: &str) -> Result<Option<ArchiveEntry>> {
        let record = self.resolve(&sidecar_path_for(path));
        if !record.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&record)
            .with_context(|| format!("Failed to read sidecar: {}", record.display()))?;
        let entry = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse sidecar: {}", record.display()))?;
        Ok(Some(entry))
    }

    fn write(&self, path: &str, entry: &ArchiveEntry) -> Result<()> {
        let record = self.resolve(&sidecar_path_for(path));
        let text = serde_json::to_string_pretty(entry)?;
        write_json_file(&record, &text)?;
        debug!(path = %record.display(), "wrote sidecar");
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let record = self.resolve(&sidecar_path_for(path));
        match std::fs::remove_file(&record) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", record.display())),
        }
    }

    fn scan(&self) -> Result<ArchiveScan> {
        let mut folders: BTreeMap<String, FolderListing> = BTreeMap::new();

        if self.root.is_dir() {
            for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                let [year, month, name] = parts.as_slice() else {
                    continue;
                };
                if !is_archive_folder(year, month) {
                    continue;
                }

                let folder = format!("{}/{}", year, month);
                let listing = folders
                    .entry(folder.clone())
                    .or_insert_with(|| FolderListing {
                        folder,
                        ..FolderListing::default()
                    });
                if is_record_name(name) {
                    let parsed = std::fs::read_to_string(entry.path())
                        .map_err(|e| e.to_string())
                        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
                    listing.records.push((name.clone(), parsed));
                } else {
                    listing.data_files.push(name.clone());
                }
            }
        }

        let tossed = self.list_pool(TOSSED_DIR)?;
        let marked = self.list_pool(MARKED_DIR)?;
        Ok(assemble_scan(folders.into_values().collect(), tossed, marked))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn relocate(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from);
        let dest = self.resolve(to);
        if !source.exists() {
            bail!("source file does not exist: {}", source.display());
        }
        if dest.exists() {
            bail!("destination already exists: {}", dest.display());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::rename(&source, &dest).with_context(|| {
            format!("Failed to move {} to {}", source.display(), dest.display())
        })?;
        debug!(from = %from, to = %to, "relocated");
        Ok(())
    }

    fn store_data(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let dest = self.resolve(path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&dest, bytes).with_context(|| format!("Failed to write {}", dest.display()))
    }

    fn load_index(&self) -> Result<BatchIndex> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(BatchIndex::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save_index(&self, index: &BatchIndex) -> Result<()> {
        let text = serde_json::to_string_pretty(index)?;
        write_json_file(&self.root.join(INDEX_FILE), &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_pairs_and_pools() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        store.store_data("2024/03/A.jpg", b"img").unwrap();
        store.write("2024/03/A.jpg", &ArchiveEntry::new("a.jpg")).unwrap();
        store.store_data("2024/undated/Lost.jpg", b"img").unwrap();
        store.store_data("tossed/t.jpg", b"img").unwrap();
        store.write("tossed/t.jpg", &ArchiveEntry::new("t.jpg")).unwrap();
        store.store_data("misc/x/y.jpg", b"ignored").unwrap();

        let scan = store.scan().unwrap();
        assert_eq!(scan.accepted["a.jpg"].record_path, "2024/03/A.json");
        assert_eq!(
            scan.accepted["a.jpg"].data_path.as_deref(),
            Some("2024/03/A.jpg")
        );
        assert!(scan.orphans.contains("2024/undated/Lost.jpg"));
        assert_eq!(scan.tossed.iter().collect::<Vec<_>>(), vec!["t.jpg"]);
        assert!(scan.marked.is_empty());
    }

    #[test]
    fn test_sidecar_keeps_non_ascii() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let mut entry = ArchiveEntry::new("a.jpg");
        entry.batch_id = Some(1);
        store.write("2024/03/2024年3月5日 10：00 Cafe.jpg", &entry).unwrap();
        let text =
            std::fs::read_to_string(tmp.path().join("2024/03/2024年3月5日 10：00 Cafe.json")).unwrap();
        assert!(text.contains("\"original_filename\": \"a.jpg\""));
        assert_eq!(
            store.read("2024/03/2024年3月5日 10：00 Cafe.jpg").unwrap(),
            Some(entry)
        );
    }

    #[test]
    fn test_missing_index_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        assert!(store.load_index().unwrap().batches.is_empty());
    }

    #[test]
    fn test_relocate_missing_source() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        assert!(store.relocate("2024/01/none.jpg", "2024/02/none.jpg").is_err());
        store.delete("2024/01/none.jpg").unwrap();
    }

    #[test]
    fn test_relocate_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        store.store_data("2024/03/A.jpg", b"first").unwrap();
        store.store_data("2024/03/B.jpg", b"second").unwrap();

        assert!(store.relocate("2024/03/A.jpg", "2024/03/B.jpg").is_err());
        assert_eq!(std::fs::read(tmp.path().join("2024/03/A.jpg")).unwrap(), b"first");
        assert_eq!(std::fs::read(tmp.path().join("2024/03/B.jpg")).unwrap(), b"second");
    }

    #[test]
    fn test_pool_sidecars_are_keyed_by_full_name() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        store.store_data("marked/a.jpg", b"jpg").unwrap();
        store.store_data("marked/a.png", b"png").unwrap();
        store.write("marked/a.jpg", &ArchiveEntry::new("a.jpg")).unwrap();
        store.write("marked/a.png", &ArchiveEntry::new("a.png")).unwrap();

        assert!(tmp.path().join("marked/a.jpg.json").exists());
        assert!(tmp.path().join("marked/a.png.json").exists());
        assert_eq!(
            store.read("marked/a.jpg").unwrap().map(|e| e.original_filename),
            Some("a.jpg".to_string())
        );
        let scan = store.scan().unwrap();
        assert_eq!(scan.marked.iter().collect::<Vec<_>>(), vec!["a.jpg", "a.png"]);
    }
}
