//! Merchant name workflows.
//!
//! Names drift: OCR and reviewers spell the same merchant several ways.
//! This module clusters the names in use, merges variants onto a canonical
//! spelling (rewriting sidecars and reconciling their placement), records
//! pairs that only look alike, and answers similar-name and suggestion
//! queries.
//!
//! State lives next to the archive: `name_normalizations.json`,
//! `distinct_pairs.json`, `name_embeddings.json` and `name_cache.json`.

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use scanshelf_core::cluster::{
    cluster_names, similar_names, suggest_names, visible_clusters, DistanceMetric, StringMetric,
};
use scanshelf_core::error::NameError;
use scanshelf_core::reconcile::{reconcile, Relocation};
use scanshelf_core::store::MetadataStore;

use crate::config::Config;
use crate::embedding::metric::EmbeddingMetric;
use crate::fs_store::FsStore;
use crate::persist::{
    load_distinct_pairs, load_name_cache, load_normalizations, save_distinct_pairs,
    save_normalizations,
};

const DEFAULT_SIMILAR_TOP: usize = 10;
const DEFAULT_SUGGEST_TOP: usize = 5;

/// Names used by archived decisions.
pub fn decision_names<S: MetadataStore + ?Sized>(store: &S) -> Result<BTreeSet<String>> {
    Ok(store
        .scan()?
        .decisions()
        .into_values()
        .map(|d| d.name)
        .filter(|n| !n.is_empty())
        .collect())
}

/// Decision names plus every canonical name of the normalization map.
pub fn candidate_names<S: MetadataStore + ?Sized>(
    store: &S,
    state_dir: &Path,
) -> Result<Vec<String>> {
    let mut names = decision_names(store)?;
    names.extend(load_normalizations(state_dir)?.canonical_names());
    Ok(names.into_iter().collect())
}

/// Build the metric for `engine` ("string" or "embedding").
pub fn metric_for(engine: &str, config: &Config) -> Result<Box<dyn DistanceMetric>> {
    match engine {
        "string" => Ok(Box::new(StringMetric)),
        "embedding" => {
            if !config.embedding.is_enabled() {
                bail!("names engine 'embedding' requires an embedding provider");
            }
            Ok(Box::new(EmbeddingMetric::new(
                &config.embedding,
                &config.paths.archive,
            )?))
        }
        other => bail!("Unknown names engine: {}", other),
    }
}

/// Clusters of near-identical names worth offering for a merge.
pub async fn find_name_clusters<S, M>(
    store: &S,
    state_dir: &Path,
    metric: &M,
    threshold: f64,
) -> Result<Vec<Vec<String>>>
where
    S: MetadataStore + ?Sized,
    M: DistanceMetric + ?Sized,
{
    let in_use = decision_names(store)?;
    let mut names = in_use.clone();
    names.extend(load_normalizations(state_dir)?.canonical_names());
    let names: Vec<String> = names.into_iter().collect();

    let clusters = cluster_names(metric, &names, threshold).await?;
    debug!(raw = clusters.len(), names = names.len(), "name clusters");
    let distinct = load_distinct_pairs(state_dir)?;
    let normalizations = load_normalizations(state_dir)?;
    Ok(visible_clusters(clusters, &in_use, &distinct, &normalizations))
}

/// Map `variants` (and `target`, if it is itself a variant) onto the
/// canonical form of `target`.
///
/// Every sidecar whose decision name was rewritten gets the canonical name,
/// the map is saved and the archive is reconciled. Returns the moves the
/// reconciler made. Nothing is written when the merged class (the canonical
/// and every spelling that would resolve to it, including earlier merges)
/// holds a confirmed distinct pair.
pub fn merge_names<S: MetadataStore + ?Sized>(
    store: &S,
    state_dir: &Path,
    target: &str,
    variants: &[String],
) -> Result<Vec<Relocation>> {
    let distinct = load_distinct_pairs(state_dir)?;
    let mut map = load_normalizations(state_dir)?;
    let (canonical, rewritten) = map.merge(target, variants)?;
    if let Some((a, b)) = distinct.conflict(&map.class_of(&canonical)) {
        return Err(NameError::DistinctConflict(a.to_string(), b.to_string()).into());
    }

    let scan = store.scan()?;
    let mut updated = 0;
    for entry in scan.accepted.values() {
        let Some(review) = &entry.record.review else {
            continue;
        };
        if !rewritten.contains(&review.name) {
            continue;
        }
        let mut record = entry.record.clone();
        if let Some(review) = record.review.as_mut() {
            review.name = canonical.clone();
        }
        // Without a data file the record path itself names the sidecar.
        let path = entry.data_path.as_deref().unwrap_or(&entry.record_path);
        store.write(path, &record)?;
        updated += 1;
    }
    save_normalizations(state_dir, &map)?;
    info!(
        canonical = %canonical,
        variants = rewritten.len(),
        sidecars = updated,
        "names merged"
    );

    reconcile(store)
}

/// Record that `a` and `b` are different merchants. Returns false if the
/// pair was already recorded.
pub fn confirm_distinct(state_dir: &Path, a: &str, b: &str) -> Result<bool> {
    if a == b {
        bail!("a name cannot be distinct from itself");
    }
    let mut pairs = load_distinct_pairs(state_dir)?;
    let added = pairs.insert(a, b);
    if added {
        save_distinct_pairs(state_dir, &pairs)?;
    }
    Ok(added)
}

pub fn remove_distinct(state_dir: &Path, a: &str, b: &str) -> Result<bool> {
    let mut pairs = load_distinct_pairs(state_dir)?;
    let removed = pairs.remove(a, b);
    if removed {
        save_distinct_pairs(state_dir, &pairs)?;
    }
    Ok(removed)
}

/// Confirmed names previously chosen for extracted names resembling `query`.
pub fn suggest_confirmed_names(
    state_dir: &Path,
    query: &str,
    top_n: usize,
) -> Result<(Vec<String>, Option<f64>)> {
    let cache = load_name_cache(state_dir)?;
    Ok(suggest_names(
        query,
        cache
            .values()
            .filter(|pair| !pair.extracted.is_empty() && !pair.confirmed.is_empty())
            .map(|pair| (pair.extracted.as_str(), pair.confirmed.as_str())),
        top_n,
    ))
}

pub async fn run_clusters(
    config: &Config,
    engine: Option<&str>,
    threshold: Option<f64>,
) -> Result<()> {
    let engine = engine.unwrap_or(&config.names.engine);
    let threshold = threshold.unwrap_or_else(|| config.names.threshold_for(engine));
    if !(threshold > 0.0 && threshold <= 1.0) {
        bail!("threshold must be in (0, 1], got {}", threshold);
    }
    let metric = metric_for(engine, config)?;
    let store = FsStore::new(&config.paths.archive);
    let clusters =
        find_name_clusters(&store, &config.paths.archive, metric.as_ref(), threshold).await?;

    println!("name clusters");
    println!("  metric: {}", metric.label());
    println!("  threshold: {}", threshold);
    println!("  clusters: {}", clusters.len());
    for (i, cluster) in clusters.iter().enumerate() {
        println!("  {}: {}", i + 1, cluster.join(" | "));
    }
    Ok(())
}

pub fn run_merge(config: &Config, target: &str, variants: &[String]) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let moves = merge_names(&store, &config.paths.archive, target, variants)?;
    println!("merge");
    println!("  target: {}", target);
    println!("  variants: {}", variants.join(", "));
    println!("  moved: {}", moves.len());
    for mv in &moves {
        println!("  {}: {} -> {}", mv.filename, mv.from, mv.to);
    }
    Ok(())
}

pub fn run_distinct(config: &Config, a: &str, b: &str) -> Result<()> {
    if confirm_distinct(&config.paths.archive, a, b)? {
        println!("distinct: '{}' / '{}'", a, b);
    } else {
        println!("already distinct: '{}' / '{}'", a, b);
    }
    Ok(())
}

pub fn run_undistinct(config: &Config, a: &str, b: &str) -> Result<()> {
    if remove_distinct(&config.paths.archive, a, b)? {
        println!("removed: '{}' / '{}'", a, b);
    } else {
        println!("not recorded: '{}' / '{}'", a, b);
    }
    Ok(())
}

pub fn run_pairs(config: &Config) -> Result<()> {
    let pairs = load_distinct_pairs(&config.paths.archive)?;
    println!("distinct pairs: {}", pairs.len());
    for (a, b) in pairs.iter() {
        println!("  '{}' / '{}'", a, b);
    }
    Ok(())
}

pub async fn run_similar(
    config: &Config,
    name: &str,
    threshold: Option<f64>,
    top: Option<usize>,
) -> Result<()> {
    let engine = config.names.engine.as_str();
    let threshold = threshold.unwrap_or_else(|| config.names.threshold_for(engine));
    let metric = metric_for(engine, config)?;
    let store = FsStore::new(&config.paths.archive);
    let names = candidate_names(&store, &config.paths.archive)?;
    let hits = similar_names(
        metric.as_ref(),
        name,
        &names,
        threshold,
        top.unwrap_or(DEFAULT_SIMILAR_TOP),
    )
    .await?;

    println!("similar to '{}'", name);
    println!("  metric: {}", metric.label());
    println!("  matches: {}", hits.len());
    for (hit, distance) in &hits {
        println!("  {:.3}  {}", distance, hit);
    }
    Ok(())
}

pub fn run_suggest(config: &Config, query: &str, top: Option<usize>) -> Result<()> {
    let (names, best) =
        suggest_confirmed_names(&config.paths.archive, query, top.unwrap_or(DEFAULT_SUGGEST_TOP))?;
    println!("suggestions for '{}'", query);
    if let Some(best) = best {
        println!("  best similarity: {:.3}", best);
    }
    println!("  matches: {}", names.len());
    for name in &names {
        println!("  {}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::save_name_cache;
    use scanshelf_core::models::{ArchiveEntry, Decision, DocumentType, NameCache, NamePair, Verdict};
    use scanshelf_core::store::memory::InMemoryStore;
    use tempfile::TempDir;

    fn decision(name: &str, time: &str) -> Decision {
        Decision {
            verdict: Verdict::Accepted,
            document_type: DocumentType::Receipt,
            name: name.to_string(),
            date: "2024-03-05".to_string(),
            time: time.to_string(),
            cost: 4.5,
            currency: "EUR".to_string(),
        }
    }

    fn archive(store: &InMemoryStore, path: &str, filename: &str, dec: Decision) {
        store.put_file(path, "img");
        let mut entry = ArchiveEntry::new(filename);
        entry.review = Some(dec);
        store.write(path, &entry).unwrap();
    }

    #[tokio::test]
    async fn test_clusters_skip_distinct_pairs() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "a.jpg", decision("Cafe", "10:00"));
        archive(&store, "2024/03/2024年3月5日 11：00 Cafe .jpg", "b.jpg", decision("Cafe ", "11:00"));
        archive(&store, "2024/03/2024年3月5日 12：00 Museum.jpg", "c.jpg", decision("Museum", "12:00"));

        let clusters = find_name_clusters(&store, tmp.path(), &StringMetric, 0.2)
            .await
            .unwrap();
        assert_eq!(clusters, vec![vec!["Cafe".to_string(), "Cafe ".to_string()]]);

        confirm_distinct(tmp.path(), "Cafe", "Cafe ").unwrap();
        let clusters = find_name_clusters(&store, tmp.path(), &StringMetric, 0.2)
            .await
            .unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_merge_rewrites_sidecars_and_reconciles() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Caffe.jpg", "a.jpg", decision("Caffe", "10:00"));
        archive(&store, "2024/03/2024年3月5日 10：05 Cafe.jpg", "b.jpg", decision("Cafe", "10:05"));

        let moves = merge_names(&store, tmp.path(), "Cafe", &["Caffe".to_string()]).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].filename, "a.jpg");
        assert_eq!(moves[0].to, "2024/03/2024年3月5日 10：00 Cafe.jpg");

        let entry = store.read("2024/03/2024年3月5日 10：00 Cafe.jpg").unwrap().unwrap();
        assert_eq!(entry.review.unwrap().name, "Cafe");
        let map = load_normalizations(tmp.path()).unwrap();
        assert_eq!(map.get("Caffe"), Some("Cafe"));
        assert!(!store.exists("2024/03/2024年3月5日 10：00 Caffe.jpg"));
    }

    #[test]
    fn test_merge_of_distinct_pair_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe .jpg", "a.jpg", decision("Cafe ", "10:00"));
        confirm_distinct(tmp.path(), "Cafe", "Cafe ").unwrap();

        let err = merge_names(&store, tmp.path(), "Cafe", &["Cafe ".to_string()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NameError>(),
            Some(NameError::DistinctConflict(_, _))
        ));
        assert!(load_normalizations(tmp.path()).unwrap().is_empty());
        let entry = store.read("2024/03/2024年3月5日 10：00 Cafe .jpg").unwrap().unwrap();
        assert_eq!(entry.review.unwrap().name, "Cafe ");
    }

    #[test]
    fn test_second_merge_cannot_join_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Lawson.jpg", "a.jpg", decision("Lawson", "10:00"));
        archive(&store, "2024/03/2024年3月5日 11：00 Lawsons.jpg", "b.jpg", decision("Lawsons", "11:00"));
        confirm_distinct(tmp.path(), "Lawson", "Lawsons").unwrap();

        merge_names(&store, tmp.path(), "LAWSON", &["Lawson".to_string()]).unwrap();
        let err = merge_names(&store, tmp.path(), "LAWSON", &["Lawsons".to_string()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NameError>(),
            Some(NameError::DistinctConflict(_, _))
        ));

        let map = load_normalizations(tmp.path()).unwrap();
        assert_eq!(map.get("Lawson"), Some("LAWSON"));
        assert_eq!(map.get("Lawsons"), None);
        let entry = store.read("2024/03/2024年3月5日 11：00 Lawsons.jpg").unwrap().unwrap();
        assert_eq!(entry.review.unwrap().name, "Lawsons");
    }

    #[test]
    fn test_merge_into_variant_of_distinct_name_is_refused() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        confirm_distinct(tmp.path(), "Shell", "Shelf").unwrap();
        merge_names(&store, tmp.path(), "Shell", &["SHELL".to_string()]).unwrap();

        // SHELL resolves to Shell, so Shelf would join Shell's class
        assert!(merge_names(&store, tmp.path(), "SHELL", &["Shelf".to_string()]).is_err());
        assert_eq!(load_normalizations(tmp.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clusters_keep_merged_class_apart_from_distinct_name() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 LAWSON.jpg", "a.jpg", decision("LAWSON", "10:00"));
        archive(&store, "2024/03/2024年3月5日 11：00 LAWSONS.jpg", "b.jpg", decision("LAWSONS", "11:00"));
        confirm_distinct(tmp.path(), "Lawson", "LAWSONS").unwrap();
        let mut map = load_normalizations(tmp.path()).unwrap();
        map.merge("LAWSON", &["Lawson".to_string()]).unwrap();
        save_normalizations(tmp.path(), &map).unwrap();

        let clusters = find_name_clusters(&store, tmp.path(), &StringMetric, 0.2)
            .await
            .unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_distinct_roundtrip() {
        let tmp = TempDir::new().unwrap();
        assert!(confirm_distinct(tmp.path(), "Shell", "Shelf").unwrap());
        assert!(!confirm_distinct(tmp.path(), "Shelf", "Shell").unwrap());
        assert!(confirm_distinct(tmp.path(), "Shell", "Shell").is_err());
        assert!(remove_distinct(tmp.path(), "Shelf", "Shell").unwrap());
        assert!(load_distinct_pairs(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_include_canonical_names() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "a.jpg", decision("Cafe", "10:00"));
        let mut map = load_normalizations(tmp.path()).unwrap();
        map.merge("Bakery", &["Bakry".to_string()]).unwrap();
        save_normalizations(tmp.path(), &map).unwrap();

        let names = candidate_names(&store, tmp.path()).unwrap();
        assert_eq!(names, vec!["Bakery".to_string(), "Cafe".to_string()]);
    }

    #[test]
    fn test_suggest_from_name_cache() {
        let tmp = TempDir::new().unwrap();
        let mut cache = NameCache::new();
        for (file, extracted, confirmed) in [
            ("a.jpg", "STARBUCKS COFFEE", "Starbucks"),
            ("b.jpg", "STARBUCKS COFFE", "Starbucks"),
            ("c.jpg", "", "Museum"),
        ] {
            cache.insert(
                file.to_string(),
                NamePair {
                    extracted: extracted.to_string(),
                    confirmed: confirmed.to_string(),
                },
            );
        }
        save_name_cache(tmp.path(), &cache).unwrap();

        let (names, best) = suggest_confirmed_names(tmp.path(), "STARBUCKS COFFEE", 5).unwrap();
        assert_eq!(names, vec!["Starbucks".to_string()]);
        assert_eq!(best, Some(1.0));
    }
}
