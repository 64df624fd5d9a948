//! Collision-free destination planning.
//!
//! Documents that map to the same `(folder, base)` are ordered by
//! tie-break seconds, then batch id, then serial, which approximates true
//! capture order when timestamps collide to the minute. The first one gets
//! the bare base name; the rest get ` (2)`, ` (3)`, … skipping every stem
//! already taken on disk.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::capture::file_extension;
use crate::models::Decision;
use crate::naming::{build_archive_name, TieBreak};

/// Display stems already present, keyed by folder (`"2024/03"`).
pub type TakenStems = HashMap<String, HashSet<String>>;

/// An accepted document waiting for a destination.
#[derive(Debug, Clone)]
pub struct PendingDocument<'a> {
    pub filename: &'a str,
    pub decision: &'a Decision,
    pub batch_id: Option<u32>,
    pub serial: Option<u32>,
}

struct Member<'a> {
    filename: &'a str,
    tie_break: TieBreak,
    batch_id: u32,
    serial: u32,
}

/// Assign every pending document a relative destination path.
///
/// Fails if any document's archive name cannot be built. No two documents
/// in one call receive the same destination, and none collides with a stem
/// in `taken`.
pub fn plan_destinations(
    pending: &[PendingDocument<'_>],
    taken: &TakenStems,
) -> Result<BTreeMap<String, String>> {
    let mut groups: BTreeMap<(String, String), Vec<Member<'_>>> = BTreeMap::new();
    for doc in pending {
        let name = build_archive_name(doc.decision, doc.filename)?;
        groups
            .entry((name.folder, name.base))
            .or_default()
            .push(Member {
                filename: doc.filename,
                tie_break: name.tie_break,
                batch_id: doc.batch_id.unwrap_or(0),
                serial: doc.serial.unwrap_or(0),
            });
    }

    let empty = HashSet::new();
    let mut destinations = BTreeMap::new();
    for ((folder, base), mut members) in groups {
        members.sort_by(|a, b| {
            (a.tie_break, a.batch_id, a.serial, a.filename)
                .cmp(&(b.tie_break, b.batch_id, b.serial, b.filename))
        });

        let on_disk = taken.get(&folder).unwrap_or(&empty);
        let mut allocator = SuffixAllocator::new(&base, on_disk);
        for member in &members {
            let stem = allocator.next_stem();
            let dest = format!("{}/{}{}", folder, stem, file_extension(member.filename));
            destinations.insert(member.filename.to_string(), dest);
        }
    }
    Ok(destinations)
}

/// Destination for a single document against the stems already on disk.
pub fn resolve_single_destination(
    filename: &str,
    decision: &Decision,
    taken: &TakenStems,
) -> Result<String> {
    let name = build_archive_name(decision, filename)?;
    let empty = HashSet::new();
    let on_disk = taken.get(&name.folder).unwrap_or(&empty);
    let stem = SuffixAllocator::new(&name.base, on_disk).next_stem();
    Ok(format!("{}/{}{}", name.folder, stem, file_extension(filename)))
}

/// Hands out `base`, `base (2)`, `base (3)`, … skipping taken stems.
struct SuffixAllocator<'a> {
    base: &'a str,
    taken: &'a HashSet<String>,
    bare_available: bool,
    next_suffix: u32,
}

impl<'a> SuffixAllocator<'a> {
    fn new(base: &'a str, taken: &'a HashSet<String>) -> Self {
        Self {
            base,
            taken,
            bare_available: !taken.contains(base),
            next_suffix: 2,
        }
    }

    fn next_stem(&mut self) -> String {
        if self.bare_available {
            self.bare_available = false;
            return self.base.to_string();
        }
        loop {
            let candidate = format!("{} ({})", self.base, self.next_suffix);
            self.next_suffix += 1;
            if !self.taken.contains(&candidate) {
                return candidate;
            }
        }
    }
}
