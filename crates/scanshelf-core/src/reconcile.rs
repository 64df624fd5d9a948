//! Drift detection and repair for the archive tree.
//!
//! A full pass recomputes where every accepted document should live and
//! moves the ones that drifted:
//!
//! 1. Scan the store.
//! 2. Recompute `(folder, base)` for each entry with a decision.
//! 3. An entry is **stable** if it sits in the expected folder and its stem
//!    is `base` or `base (N)`.
//! 4. Everything else is **stale** and is re-planned. Every stem currently
//!    occupied in the tree (stable entries, stale entries still waiting to
//!    move, unparseable sidecars, orphan data files) is reserved, so no
//!    planned destination lands on an existing file.
//! 5. Stale entries are moved (data file first, then sidecar).
//!
//! A sidecar whose data file is missing is re-paired with an orphan data
//! file in its expected folder whose stem is `base` or `base (N)` and whose
//! extension matches; that is what a move interrupted between its two
//! halves leaves behind.
//!
//! The pass is idempotent: a second run with no intervening changes finds
//! every entry stable and moves nothing.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::capture::{file_extension, file_stem};
use crate::models::Decision;
use crate::naming::{build_archive_name, stem_matches_base, ArchiveName};
use crate::planner::{plan_destinations, PendingDocument, TakenStems};
use crate::store::{sidecar_path_for, split_folder, ArchiveScan, MetadataStore};

/// One document moved by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub filename: String,
    /// Previous data path; empty if only the sidecar existed.
    pub from: String,
    pub to: String,
}

/// A stale entry and the destination planned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub filename: String,
    /// `None` when only the sidecar moves onto an already placed data file.
    pub data_path: Option<String>,
    pub record_path: String,
    pub destination: String,
}

/// Outcome of comparing the scanned tree with expected placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub stable: usize,
    pub moves: Vec<PlannedMove>,
}

/// Orphan in the expected folder that looks like the data half of `filename`.
fn claim_orphan(
    unclaimed: &mut BTreeSet<String>,
    expected: &ArchiveName,
    filename: &str,
) -> Option<String> {
    let extension = file_extension(filename);
    let found = unclaimed
        .iter()
        .find(|path| {
            let (folder, name) = split_folder(path.as_str());
            folder == expected.folder
                && file_extension(name) == extension
                && stem_matches_base(file_stem(name), &expected.base)
        })
        .cloned()?;
    unclaimed.remove(&found);
    Some(found)
}

/// Compute which entries drifted and where they should go.
pub fn plan_reconcile(scan: &ArchiveScan) -> Result<ReconcilePlan> {
    // Every sidecar and orphan stem, stable or not.
    let reserved: TakenStems = scan.taken_stems();
    let mut unclaimed = scan.orphans.clone();

    let mut stale: Vec<(&str, &Decision, Option<u32>, Option<u32>)> = Vec::new();
    let mut repairs = Vec::new();
    let mut stable = 0;

    for (filename, entry) in &scan.accepted {
        let Some(decision) = entry.record.review.as_ref() else {
            continue;
        };
        let expected = match build_archive_name(decision, filename) {
            Ok(name) => name,
            Err(e) => {
                warn!(filename = %filename, error = %e, "cannot derive archive name, leaving in place");
                continue;
            }
        };

        let Some(path) = entry.data_path.as_deref() else {
            match claim_orphan(&mut unclaimed, &expected, filename) {
                Some(orphan) => repairs.push(PlannedMove {
                    filename: filename.clone(),
                    data_path: None,
                    record_path: entry.record_path.clone(),
                    destination: orphan,
                }),
                None => warn!(
                    filename = %filename,
                    record = %entry.record_path,
                    "sidecar has no data file, skipping"
                ),
            }
            continue;
        };

        let (folder, name) = split_folder(path);
        if folder == expected.folder && stem_matches_base(file_stem(name), &expected.base) {
            stable += 1;
        } else {
            stale.push((
                filename.as_str(),
                decision,
                entry.record.batch_id,
                entry.record.serial,
            ));
        }
    }

    let mut moves = repairs;
    if !stale.is_empty() {
        let pending: Vec<PendingDocument<'_>> = stale
            .iter()
            .map(|&(filename, decision, batch_id, serial)| PendingDocument {
                filename,
                decision,
                batch_id,
                serial,
            })
            .collect();
        let destinations: BTreeMap<String, String> = plan_destinations(&pending, &reserved)?;

        for (filename, destination) in destinations {
            let entry = &scan.accepted[&filename];
            if entry.data_path.as_deref() == Some(destination.as_str()) {
                continue;
            }
            moves.push(PlannedMove {
                filename,
                data_path: entry.data_path.clone(),
                record_path: entry.record_path.clone(),
                destination,
            });
        }
    }
    debug!(stable, moves = moves.len(), "reconcile plan");
    Ok(ReconcilePlan { stable, moves })
}

/// Run a full reconciliation pass against `store`.
///
/// Returns the moves actually performed. A missing source file is logged and
/// skipped; any other move failure aborts the pass without rolling back the
/// moves already made.
pub fn reconcile<S: MetadataStore + ?Sized>(store: &S) -> Result<Vec<Relocation>> {
    let scan = store.scan()?;
    let plan = plan_reconcile(&scan)?;
    let mut performed = Vec::new();

    for mv in plan.moves {
        let record_dest = sidecar_path_for(&mv.destination);
        match &mv.data_path {
            Some(data_path) => {
                if !store.exists(data_path) {
                    warn!(filename = %mv.filename, path = %data_path, "source file missing, skipping");
                    continue;
                }
                store
                    .relocate(data_path, &mv.destination)
                    .with_context(|| format!("Failed to move {} to {}", data_path, mv.destination))?;
                if store.exists(&mv.record_path) {
                    store.relocate(&mv.record_path, &record_dest).with_context(|| {
                        format!("Failed to move {} to {}", mv.record_path, record_dest)
                    })?;
                }
                info!(filename = %mv.filename, from = %data_path, to = %mv.destination, "moved");
                performed.push(Relocation {
                    filename: mv.filename,
                    from: data_path.clone(),
                    to: mv.destination,
                });
            }
            None => {
                store.relocate(&mv.record_path, &record_dest).with_context(|| {
                    format!("Failed to move {} to {}", mv.record_path, record_dest)
                })?;
                info!(filename = %mv.filename, record = %record_dest, "re-paired sidecar with its data file");
                performed.push(Relocation {
                    filename: mv.filename,
                    from: String::new(),
                    to: mv.destination,
                });
            }
        }
    }
    Ok(performed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveEntry, DocumentType, Verdict};
    use crate::store::memory::InMemoryStore;

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

    fn archive(store: &InMemoryStore, path: &str, filename: &str, dec: Decision, serial: u32) {
        store.put_file(path, "img");
        let mut entry = ArchiveEntry::new(filename);
        entry.batch_id = Some(1);
        entry.serial = Some(serial);
        entry.review = Some(dec);
        store.write(path, &entry).unwrap();
    }

    #[test]
    fn test_stable_tree_needs_no_moves() {
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "a.jpg", decision("Cafe", "10:00"), 1);
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe (2).jpg", "b.jpg", decision("Cafe", "10:00"), 2);
        assert!(reconcile(&store).unwrap().is_empty());
    }

    #[test]
    fn test_renamed_decision_moves_and_is_idempotent() {
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe .jpg", "a.jpg", decision("Cafe", "10:00"), 1);
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "b.jpg", decision("Cafe", "10:00"), 2);

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].filename, "a.jpg");
        assert_eq!(moves[0].to, "2024/03/2024年3月5日 10：00 Cafe (2).jpg");
        assert!(store.exists("2024/03/2024年3月5日 10：00 Cafe (2).json"));
        assert!(!store.exists("2024/03/2024年3月5日 10：00 Cafe .json"));

        assert!(reconcile(&store).unwrap().is_empty());
    }

    #[test]
    fn test_date_change_moves_across_folders() {
        let store = InMemoryStore::new();
        let mut dec = decision("Bakery", "07:15");
        dec.date = "2024-04-01".to_string();
        archive(&store, "2024/03/2024年3月5日 07：15 Bakery.jpg", "a.jpg", dec, 1);

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves[0].to, "2024/04/2024年4月1日 07：15 Bakery.jpg");
        let scan = store.scan().unwrap();
        assert_eq!(
            scan.accepted["a.jpg"].data_path.as_deref(),
            Some("2024/04/2024年4月1日 07：15 Bakery.jpg")
        );
    }

    #[test]
    fn test_missing_data_file_is_skipped() {
        let store = InMemoryStore::new();
        let mut entry = ArchiveEntry::new("a.jpg");
        entry.review = Some(decision("Cafe", "10:00"));
        store.write("2024/01/Old.jpg", &entry).unwrap();

        let moves = reconcile(&store).unwrap();
        assert!(moves.is_empty());
        assert!(store.exists("2024/01/Old.json"));
    }

    #[test]
    fn test_interrupted_move_is_repaired() {
        let store = InMemoryStore::new();
        archive(&store, "2024/01/Old.jpg", "a.jpg", decision("Cafe", "10:00"), 1);
        // crash after moving the data file but before its sidecar
        store
            .relocate("2024/01/Old.jpg", "2024/03/2024年3月5日 10：00 Cafe.jpg")
            .unwrap();

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves.len(), 1);
        assert!(store.exists("2024/03/2024年3月5日 10：00 Cafe.json"));
        assert!(!store.exists("2024/01/Old.json"));
        assert!(reconcile(&store).unwrap().is_empty());
    }

    #[test]
    fn test_entries_without_decision_are_ignored() {
        let store = InMemoryStore::new();
        store.put_file("2024/01/X.jpg", "img");
        store.write("2024/01/X.jpg", &ArchiveEntry::new("x.jpg")).unwrap();
        assert!(reconcile(&store).unwrap().is_empty());
    }

    fn body_of(store: &InMemoryStore, filename: &str) -> Option<String> {
        let scan = store.scan().unwrap();
        let path = scan.accepted.get(filename)?.data_path.clone()?;
        store.contents(&path)
    }

    #[test]
    fn test_move_onto_a_stale_neighbour_keeps_both() {
        let store = InMemoryStore::new();
        // a belongs in 2024/03 as "Cafe", where b currently sits but no longer belongs
        archive(&store, "2024/04/2024年3月5日 10：00 Cafe.jpg", "a.jpg", decision("Cafe", "10:00"), 1);
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "b.jpg", decision("Cafe X", "10:00"), 2);
        store.put_file("2024/04/2024年3月5日 10：00 Cafe.jpg", "IMG-A");
        store.put_file("2024/03/2024年3月5日 10：00 Cafe.jpg", "IMG-B");

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(store.paths().len(), 4);
        assert_eq!(body_of(&store, "a.jpg").as_deref(), Some("IMG-A"));
        assert_eq!(body_of(&store, "b.jpg").as_deref(), Some("IMG-B"));

        let scan = store.scan().unwrap();
        assert_eq!(
            scan.accepted["b.jpg"].data_path.as_deref(),
            Some("2024/03/2024年3月5日 10：00 Cafe X.jpg")
        );
        assert!(scan.accepted["a.jpg"]
            .data_path
            .as_deref()
            .is_some_and(|p| p.starts_with("2024/03/")));
        assert!(scan.orphans.is_empty());
        assert!(reconcile(&store).unwrap().is_empty());
    }

    #[test]
    fn test_swapped_names_keep_both_documents() {
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Cafe.jpg", "a.jpg", decision("Bakery", "10:00"), 1);
        archive(&store, "2024/03/2024年3月5日 10：00 Bakery.jpg", "b.jpg", decision("Cafe", "10:00"), 2);
        store.put_file("2024/03/2024年3月5日 10：00 Cafe.jpg", "IMG-A");
        store.put_file("2024/03/2024年3月5日 10：00 Bakery.jpg", "IMG-B");

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(store.paths().len(), 4);
        assert_eq!(body_of(&store, "a.jpg").as_deref(), Some("IMG-A"));
        assert_eq!(body_of(&store, "b.jpg").as_deref(), Some("IMG-B"));
        assert!(reconcile(&store).unwrap().is_empty());
    }

    #[test]
    fn test_orphan_at_planned_name_is_not_overwritten() {
        let store = InMemoryStore::new();
        archive(&store, "2024/03/2024年3月5日 10：00 Old.jpg", "a.jpg", decision("Cafe", "10:00"), 1);
        store.put_file("2024/03/2024年3月5日 10：00 Cafe.png", "STRAY");
        store.put_file("2024/03/2024年3月5日 10：00 Old.jpg", "IMG-A");

        let moves = reconcile(&store).unwrap();
        assert_eq!(moves[0].to, "2024/03/2024年3月5日 10：00 Cafe (2).jpg");
        assert_eq!(
            store.contents("2024/03/2024年3月5日 10：00 Cafe.png").as_deref(),
            Some("STRAY")
        );
        assert_eq!(body_of(&store, "a.jpg").as_deref(), Some("IMG-A"));
    }
}
