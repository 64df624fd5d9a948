//! Archive step and pool actions.
//!
//! [`archive_staged`] copies every decided capture that is not yet
//! organized into its place: accepted captures under their planned
//! `<year>/<month>` name, marked ones into `marked/`, tossed ones into
//! `tossed/`. Each copy gets a sidecar carrying batch, serial, decision, OCR
//! and extraction. Once nothing staged remains pending the staging files are
//! deleted.
//!
//! The marked-pool actions finish a second look at a capture: accept it into
//! the archive or toss it. [`toss_archived`] moves an accepted duplicate out
//! of the archive.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use scanshelf_core::models::{ArchiveEntry, Decision, NamePair, Verdict};
use scanshelf_core::planner::{plan_destinations, resolve_single_destination, PendingDocument};
use scanshelf_core::store::{sidecar_path_for, MetadataStore, MARKED_DIR, TOSSED_DIR};

use crate::config::Config;
use crate::fs_store::FsStore;
use crate::persist::{load_name_cache, save_name_cache};
use crate::staging::{clear_staging, Staging};

/// Where each pending capture will go.
#[derive(Debug, Default)]
pub struct ArchivePlan {
    /// filename → destination path relative to the archive root.
    pub destinations: BTreeMap<String, String>,
    pub already_organized: usize,
    pub accepted: usize,
    pub marked: usize,
    pub tossed: usize,
}

/// Outcome of an archive run.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub plan: ArchivePlan,
    pub archived: usize,
    /// Decided captures still not organized after the run.
    pub remaining: usize,
    pub staging_cleared: bool,
}

/// Plan destinations for decided captures that are not organized yet.
pub fn plan_archive<S: MetadataStore + ?Sized>(store: &S, staging: &Staging) -> Result<ArchivePlan> {
    let scan = store.scan()?;
    let organized = scan.organized_filenames();
    let slots = store.load_index()?.slots();

    let mut plan = ArchivePlan::default();
    let mut accepted: Vec<PendingDocument<'_>> = Vec::new();
    for (filename, decision) in &staging.decisions {
        if organized.contains(filename) {
            plan.already_organized += 1;
            continue;
        }
        match decision.verdict {
            Verdict::Accepted => {
                let slot = slots.get(filename);
                accepted.push(PendingDocument {
                    filename,
                    decision,
                    batch_id: slot.map(|s| s.batch_id),
                    serial: slot.map(|s| s.serial),
                });
            }
            Verdict::Marked => {
                plan.marked += 1;
                plan.destinations
                    .insert(filename.clone(), format!("{}/{}", MARKED_DIR, filename));
            }
            Verdict::Tossed => {
                plan.tossed += 1;
                plan.destinations
                    .insert(filename.clone(), format!("{}/{}", TOSSED_DIR, filename));
            }
        }
    }

    plan.accepted = accepted.len();
    plan.destinations
        .extend(plan_destinations(&accepted, &scan.taken_stems())?);
    Ok(plan)
}

/// Copy staged captures from `input` into the store.
///
/// `state_dir` holds the staging files and `name_cache.json`.
pub fn archive_staged<S: MetadataStore + ?Sized>(
    store: &S,
    input: &Path,
    state_dir: &Path,
    dry_run: bool,
) -> Result<ArchiveReport> {
    let staging = Staging::load(state_dir)?;
    let plan = plan_archive(store, &staging)?;
    if dry_run || plan.destinations.is_empty() {
        return Ok(ArchiveReport {
            plan,
            ..ArchiveReport::default()
        });
    }

    let slots = store.load_index()?.slots();
    let mut name_cache = load_name_cache(state_dir)?;
    let mut archived = 0;

    for (filename, dest) in &plan.destinations {
        let decision = &staging.decisions[filename];
        let source = input.join(filename);
        let bytes = std::fs::read(&source)
            .with_context(|| format!("Failed to read capture {}", source.display()))?;
        store.store_data(dest, &bytes)?;

        let slot = slots.get(filename);
        let extraction = staging.extractions.get(filename).cloned();
        let entry = ArchiveEntry {
            original_filename: filename.clone(),
            batch_id: slot.map(|s| s.batch_id),
            serial: slot.map(|s| s.serial),
            review: Some(decision.clone()),
            ocr: staging.ocr_for(filename).filter(|r| r.succeeded).cloned(),
            extraction: extraction.clone(),
        };
        store.write(dest, &entry)?;

        name_cache.insert(
            filename.clone(),
            NamePair {
                extracted: extraction
                    .as_ref()
                    .map(|e| e.proposed_name().to_string())
                    .unwrap_or_default(),
                confirmed: decision.name.clone(),
            },
        );
        info!(filename = %filename, to = %dest, "archived");
        archived += 1;
    }
    save_name_cache(state_dir, &name_cache)?;

    let organized = store.scan()?.organized_filenames();
    let remaining = staging
        .decisions
        .keys()
        .filter(|f| !organized.contains(*f))
        .count();
    let staging_cleared = remaining == 0;
    if staging_cleared {
        clear_staging(state_dir)?;
    }

    Ok(ArchiveReport {
        plan,
        archived,
        remaining,
        staging_cleared,
    })
}

/// Accept a marked capture into the archive.
///
/// Returns the new relative path. The verdict is forced to accepted and the
/// decision validated before anything moves.
pub fn accept_marked<S: MetadataStore + ?Sized>(
    store: &S,
    state_dir: &Path,
    filename: &str,
    mut decision: Decision,
) -> Result<String> {
    decision.verdict = Verdict::Accepted;
    decision.validate()?;

    let from = format!("{}/{}", MARKED_DIR, filename);
    if !store.exists(&from) {
        bail!("{} is not in the marked pool", filename);
    }
    let previous = store.read(&from)?;

    let scan = store.scan()?;
    let dest = resolve_single_destination(filename, &decision, &scan.taken_stems())?;
    store.relocate(&from, &dest)?;
    store.delete(&from)?;

    let mut entry = previous.unwrap_or_else(|| ArchiveEntry::new(filename));
    entry.original_filename = filename.to_string();
    entry.review = Some(decision.clone());
    store.write(&dest, &entry)?;

    let mut name_cache = load_name_cache(state_dir)?;
    name_cache.insert(
        filename.to_string(),
        NamePair {
            extracted: entry
                .extraction
                .as_ref()
                .map(|e| e.proposed_name().to_string())
                .unwrap_or_default(),
            confirmed: decision.name,
        },
    );
    save_name_cache(state_dir, &name_cache)?;

    info!(filename = %filename, to = %dest, "accepted from marked pool");
    Ok(dest)
}

/// Move a marked capture and its sidecar into the tossed pool.
pub fn toss_marked<S: MetadataStore + ?Sized>(store: &S, filename: &str) -> Result<String> {
    let from = format!("{}/{}", MARKED_DIR, filename);
    if !store.exists(&from) {
        bail!("{} is not in the marked pool", filename);
    }
    let to = format!("{}/{}", TOSSED_DIR, filename);
    store.move_document(&from, &to)?;
    info!(filename = %filename, "tossed from marked pool");
    Ok(to)
}

/// Move an accepted capture (usually a duplicate) into the tossed pool.
pub fn toss_archived<S: MetadataStore + ?Sized>(store: &S, filename: &str) -> Result<String> {
    let scan = store.scan()?;
    let Some(entry) = scan.accepted.get(filename) else {
        bail!("{} is not in the archive", filename);
    };
    let to = format!("{}/{}", TOSSED_DIR, filename);
    match &entry.data_path {
        Some(data_path) => store.move_document(data_path, &to)?,
        None => {
            warn!(filename = %filename, "data file missing, tossing sidecar only");
            store.relocate(&entry.record_path, &sidecar_path_for(&to))?;
        }
    }
    info!(filename = %filename, "tossed from archive");
    Ok(to)
}

pub fn run_archive(config: &Config, dry_run: bool) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let report = archive_staged(&store, &config.paths.input, &config.paths.archive, dry_run)?;
    let plan = &report.plan;

    println!("archive{}", if dry_run { " (dry-run)" } else { "" });
    println!("  already organized: {}", plan.already_organized);
    println!("  accepted: {}", plan.accepted);
    println!("  marked: {}", plan.marked);
    println!("  tossed: {}", plan.tossed);
    if dry_run {
        for (filename, dest) in &plan.destinations {
            println!("  {} -> {}", filename, dest);
        }
        return Ok(());
    }
    if plan.destinations.is_empty() {
        println!("  nothing to organize");
        return Ok(());
    }
    println!("  archived: {}", report.archived);
    if report.staging_cleared {
        println!("  all files organized; staging files removed");
    } else {
        println!("  still pending: {}", report.remaining);
    }
    Ok(())
}

pub fn run_accept_marked(config: &Config, filename: &str, decision: Decision) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let dest = accept_marked(&store, &config.paths.archive, filename, decision)?;
    println!("accepted: {} -> {}", filename, dest);
    Ok(())
}

pub fn run_toss_marked(config: &Config, filename: &str) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let dest = toss_marked(&store, filename)?;
    println!("tossed: {} -> {}", filename, dest);
    Ok(())
}

pub fn run_toss_archived(config: &Config, filename: &str) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let dest = toss_archived(&store, filename)?;
    println!("tossed: {} -> {}", filename, dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanshelf_core::models::DocumentType;
    use scanshelf_core::store::memory::InMemoryStore;
    use tempfile::TempDir;

    fn decision(verdict: Verdict, name: &str) -> Decision {
        Decision {
            verdict,
            document_type: DocumentType::Receipt,
            name: name.to_string(),
            date: "2024-03-05".to_string(),
            time: "10:00".to_string(),
            cost: 3.0,
            currency: "EUR".to_string(),
        }
    }

    #[test]
    fn test_plan_archive_routes_by_verdict() {
        let store = InMemoryStore::new();
        let mut staging = Staging::default();
        staging
            .decisions
            .insert("a.jpg".into(), decision(Verdict::Accepted, "Cafe"));
        staging
            .decisions
            .insert("b.jpg".into(), decision(Verdict::Accepted, "Cafe"));
        staging
            .decisions
            .insert("m.jpg".into(), decision(Verdict::Marked, "?"));
        staging
            .decisions
            .insert("t.jpg".into(), decision(Verdict::Tossed, "?"));

        let plan = plan_archive(&store, &staging).unwrap();
        assert_eq!(plan.accepted, 2);
        assert_eq!(plan.destinations["a.jpg"], "2024/03/2024年3月5日 10：00 Cafe.jpg");
        assert_eq!(plan.destinations["b.jpg"], "2024/03/2024年3月5日 10：00 Cafe (2).jpg");
        assert_eq!(plan.destinations["m.jpg"], "marked/m.jpg");
        assert_eq!(plan.destinations["t.jpg"], "tossed/t.jpg");
    }

    #[test]
    fn test_plan_skips_already_organized() {
        let store = InMemoryStore::new();
        store.put_file("tossed/t.jpg", "img");
        let mut staging = Staging::default();
        staging
            .decisions
            .insert("t.jpg".into(), decision(Verdict::Tossed, "?"));
        let plan = plan_archive(&store, &staging).unwrap();
        assert_eq!(plan.already_organized, 1);
        assert!(plan.destinations.is_empty());
    }

    #[test]
    fn test_accept_marked_moves_and_rewrites_sidecar() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        store.put_file("marked/m.jpg", "img");
        let mut old = ArchiveEntry::new("m.jpg");
        old.batch_id = Some(4);
        old.serial = Some(7);
        store.write("marked/m.jpg", &old).unwrap();

        let dest = accept_marked(&store, tmp.path(), "m.jpg", decision(Verdict::Marked, "Cafe"))
            .unwrap();
        assert_eq!(dest, "2024/03/2024年3月5日 10：00 Cafe.jpg");
        assert!(!store.exists("marked/m.jpg"));
        assert!(!store.exists("marked/m.jpg.json"));
        let entry = store.read(&dest).unwrap().unwrap();
        assert_eq!(entry.batch_id, Some(4));
        assert_eq!(entry.review.unwrap().verdict, Verdict::Accepted);
        assert_eq!(load_name_cache(tmp.path()).unwrap()["m.jpg"].confirmed, "Cafe");
    }

    #[test]
    fn test_accept_marked_rejects_incomplete_receipt() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        store.put_file("marked/m.jpg", "img");
        let mut dec = decision(Verdict::Accepted, "Cafe");
        dec.currency.clear();
        let err = accept_marked(&store, tmp.path(), "m.jpg", dec).unwrap_err();
        assert_eq!(err.to_string(), "Receipt requires: currency");
        assert!(store.exists("marked/m.jpg"));
    }

    #[test]
    fn test_toss_marked_and_archived() {
        let store = InMemoryStore::new();
        store.put_file("marked/m.jpg", "img");
        store.write("marked/m.jpg", &ArchiveEntry::new("m.jpg")).unwrap();
        assert_eq!(toss_marked(&store, "m.jpg").unwrap(), "tossed/m.jpg");
        assert!(store.exists("tossed/m.jpg.json"));

        store.put_file("2024/03/A.jpg", "img");
        let mut entry = ArchiveEntry::new("a.jpg");
        entry.review = Some(decision(Verdict::Accepted, "A"));
        store.write("2024/03/A.jpg", &entry).unwrap();
        toss_archived(&store, "a.jpg").unwrap();
        assert!(store.exists("tossed/a.jpg"));
        assert!(store.exists("tossed/a.jpg.json"));
        assert!(!store.exists("2024/03/A.jpg"));

        assert!(toss_archived(&store, "a.jpg").is_err());
        assert!(toss_marked(&store, "zzz.jpg").is_err());
    }

    #[test]
    fn test_archive_never_overwrites_orphan_data() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.jpg"), "new capture").unwrap();

        let store = InMemoryStore::new();
        store.put_file("2024/03/2024年3月5日 10：00 Cafe.jpg", "stray bytes");
        crate::staging::record_decision(tmp.path(), "a.jpg", decision(Verdict::Accepted, "Cafe"))
            .unwrap();

        let report = archive_staged(&store, &input, tmp.path(), false).unwrap();
        assert_eq!(report.archived, 1);
        assert_eq!(
            report.plan.destinations["a.jpg"],
            "2024/03/2024年3月5日 10：00 Cafe (2).jpg"
        );
        assert_eq!(
            store.contents("2024/03/2024年3月5日 10：00 Cafe.jpg").as_deref(),
            Some("stray bytes")
        );
        assert_eq!(
            store.contents("2024/03/2024年3月5日 10：00 Cafe (2).jpg").as_deref(),
            Some("new capture")
        );
        assert!(!store.exists("2024/03/2024年3月5日 10：00 Cafe.json"));
    }

    #[test]
    fn test_marked_captures_sharing_a_stem_keep_their_sidecars() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        for name in ["a.jpg", "a.png"] {
            store.put_file(&format!("marked/{}", name), "img");
            let mut entry = ArchiveEntry::new(name);
            entry.batch_id = Some(if name == "a.jpg" { 1 } else { 2 });
            store.write(&format!("marked/{}", name), &entry).unwrap();
        }

        toss_marked(&store, "a.png").unwrap();
        let jpg = store.read("marked/a.jpg").unwrap().unwrap();
        assert_eq!(jpg.original_filename, "a.jpg");
        assert_eq!(jpg.batch_id, Some(1));

        let dest = accept_marked(&store, tmp.path(), "a.jpg", decision(Verdict::Accepted, "Cafe"))
            .unwrap();
        assert_eq!(store.read(&dest).unwrap().unwrap().batch_id, Some(1));
        let png = store.read("tossed/a.png").unwrap().unwrap();
        assert_eq!(png.original_filename, "a.png");
        assert_eq!(png.batch_id, Some(2));
    }
}
