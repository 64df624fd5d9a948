//! `shelf dedupe` and `shelf adjacent`: report archived receipts that are
//! probably the same purchase captured twice.

use anyhow::Result;
use std::collections::BTreeMap;

use scanshelf_core::dedupe::{find_adjacent_documents, find_dedupe_clusters};
use scanshelf_core::models::Decision;
use scanshelf_core::store::MetadataStore;

use crate::config::Config;
use crate::fs_store::FsStore;

fn describe(filename: &str, decision: &Decision) -> String {
    format!(
        "{}  {} {}  {}  {} {}",
        filename, decision.date, decision.time, decision.name, decision.cost, decision.currency
    )
}

/// Print probable duplicate receipts among archived documents.
pub fn run_dedupe(config: &Config) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let decisions: BTreeMap<String, Decision> = store.scan()?.decisions();
    let clusters = find_dedupe_clusters(&decisions);

    println!("dedupe");
    println!("  receipts checked: {}", decisions.values().filter(|d| d.is_receipt()).count());
    println!("  clusters: {}", clusters.len());
    for (i, cluster) in clusters.iter().enumerate() {
        println!();
        println!("cluster {}", i + 1);
        for filename in cluster {
            println!("  {}", describe(filename, &decisions[filename]));
        }
    }
    Ok(())
}

/// Print archived receipts close in time to a candidate with the same cost.
pub fn run_adjacent(
    config: &Config,
    date: &str,
    time: &str,
    cost: f64,
    exclude: Option<&str>,
) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);
    let decisions = store.scan()?.decisions();
    let adjacent = find_adjacent_documents(date, time, cost, &decisions, exclude.unwrap_or(""));

    println!("adjacent");
    println!("  matches: {}", adjacent.len());
    for filename in &adjacent {
        println!("  {}", describe(filename, &decisions[filename]));
    }
    Ok(())
}
