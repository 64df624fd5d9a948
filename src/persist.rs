//! JSON state files kept in the archive root.
//!
//! Every file is read-modify-write; a missing file loads as the type's
//! default so a fresh archive needs no setup.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use scanshelf_core::embedding::EmbeddingCache;
use scanshelf_core::models::NameCache;
use scanshelf_core::normalize::{DistinctPairSet, NormalizationMap};

pub const NORMALIZATIONS_FILE: &str = "name_normalizations.json";
pub const DISTINCT_PAIRS_FILE: &str = "distinct_pairs.json";
pub const EMBEDDINGS_FILE: &str = "name_embeddings.json";
pub const NAME_CACHE_FILE: &str = "name_cache.json";

pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Delete a file; a missing file is fine.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

pub fn load_normalizations(root: &Path) -> Result<NormalizationMap> {
    load_json(&root.join(NORMALIZATIONS_FILE))
}

pub fn save_normalizations(root: &Path, map: &NormalizationMap) -> Result<()> {
    save_json(&root.join(NORMALIZATIONS_FILE), map)
}

pub fn load_distinct_pairs(root: &Path) -> Result<DistinctPairSet> {
    load_json(&root.join(DISTINCT_PAIRS_FILE))
}

pub fn save_distinct_pairs(root: &Path, pairs: &DistinctPairSet) -> Result<()> {
    save_json(&root.join(DISTINCT_PAIRS_FILE), pairs)
}

pub fn load_embeddings(root: &Path) -> Result<EmbeddingCache> {
    load_json(&root.join(EMBEDDINGS_FILE))
}

pub fn save_embeddings(root: &Path, cache: &EmbeddingCache) -> Result<()> {
    save_json(&root.join(EMBEDDINGS_FILE), cache)
}

pub fn load_name_cache(root: &Path) -> Result<NameCache> {
    load_json(&root.join(NAME_CACHE_FILE))
}

pub fn save_name_cache(root: &Path, cache: &NameCache) -> Result<()> {
    save_json(&root.join(NAME_CACHE_FILE), cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_load_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(load_normalizations(tmp.path()).unwrap().is_empty());
        assert!(load_distinct_pairs(tmp.path()).unwrap().is_empty());
        assert!(load_embeddings(tmp.path()).unwrap().is_empty());
        assert!(load_name_cache(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_normalizations_file_is_flat_object() {
        let tmp = TempDir::new().unwrap();
        let mut map = NormalizationMap::new();
        map.merge("Cafe", &["Cafe ".to_string()]).unwrap();
        save_normalizations(tmp.path(), &map).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join(NORMALIZATIONS_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw, serde_json::json!({"Cafe ": "Cafe"}));
        assert_eq!(load_normalizations(tmp.path()).unwrap(), map);
    }

    #[test]
    fn test_remove_if_exists_tolerates_missing() {
        let tmp = TempDir::new().unwrap();
        remove_if_exists(&tmp.path().join("nope.json")).unwrap();
    }
}
