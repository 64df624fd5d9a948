//! `shelf reconcile`: move archived documents to where their sidecar
//! decisions place them, or list the planned moves with `--dry-run`.

use anyhow::Result;

use scanshelf_core::reconcile::{plan_reconcile, reconcile};
use scanshelf_core::store::MetadataStore;

use crate::config::Config;
use crate::fs_store::FsStore;

/// Repair drift between sidecar decisions and on-disk placement.
pub fn run_reconcile(config: &Config, dry_run: bool) -> Result<()> {
    let store = FsStore::new(&config.paths.archive);

    if dry_run {
        let scan = store.scan()?;
        let plan = plan_reconcile(&scan)?;
        println!("reconcile (dry-run)");
        println!("  stable: {}", plan.stable);
        println!("  to move: {}", plan.moves.len());
        for mv in &plan.moves {
            println!(
                "  {} -> {}",
                mv.data_path.as_deref().unwrap_or(&mv.record_path),
                mv.destination
            );
        }
        return Ok(());
    }

    let moves = reconcile(&store)?;
    println!("reconcile");
    println!("  moved: {}", moves.len());
    for mv in &moves {
        if mv.from.is_empty() {
            println!("  {}: sidecar re-paired at {}", mv.filename, mv.to);
        } else {
            println!("  {}: {} -> {}", mv.filename, mv.from, mv.to);
        }
    }
    Ok(())
}
