//! `shelf index` and `shelf status`.
//!
//! Indexing lists the capture files in the input folder (filtered by the
//! configured include globs), groups the ones not yet in `batches.json` into
//! shooting sessions and appends them to the index. Status counts input,
//! indexed, staged and archived captures.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use scanshelf_core::indexing::{extend_index, unindexed_filenames};
use scanshelf_core::store::MetadataStore;

use crate::config::Config;
use crate::fs_store::FsStore;
use crate::staging::load_decisions;

/// Capture filenames directly under `input` that match the include globs,
/// sorted.
pub fn list_input_files(input: &Path, include_globs: &[String]) -> Result<Vec<String>> {
    if !input.is_dir() {
        bail!("Input directory does not exist: {}", input.display());
    }
    let include_set = build_globset(include_globs)?;

    let mut names = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if include_set.is_match(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

/// Index new capture files and append them to `batches.json`.
pub fn run_index(config: &Config, dry_run: bool) -> Result<()> {
    let scheme = config.indexing.scheme()?;
    let files = list_input_files(&config.paths.input, &config.indexing.include_globs)?;
    let store = FsStore::new(&config.paths.archive);
    let existing = store.load_index()?;

    let update = extend_index(&existing, &files, scheme)?;
    for warning in &update.warnings {
        warn!("{}", warning);
    }
    for name in &update.skipped {
        warn!(filename = %name, "unrecognized capture filename, skipped");
    }

    println!("index{}", if dry_run { " (dry-run)" } else { "" });
    println!("  scheme: {}", scheme.label());
    println!("  input files: {}", files.len());
    println!("  new batches: {}", update.new_batches.len());
    println!("  newly indexed: {}", update.newly_indexed());
    println!("  skipped: {}", update.skipped.len());
    println!("  warnings: {}", update.warnings.len());
    for batch in &update.new_batches {
        println!(
            "  batch {}: {} file(s), {} .. {}",
            batch.batch_id,
            batch.files.len(),
            batch.start_datetime,
            batch.end_datetime
        );
    }

    if dry_run || update.new_batches.is_empty() {
        return Ok(());
    }
    store.save_index(&update.index)?;
    info!(batches = update.index.batches.len(), "index saved");
    println!("ok");
    Ok(())
}

/// Print counts of input, indexed, staged and archived captures.
pub fn run_status(config: &Config) -> Result<()> {
    let files = list_input_files(&config.paths.input, &config.indexing.include_globs)?;
    let store = FsStore::new(&config.paths.archive);
    let index = store.load_index()?;
    let unindexed = unindexed_filenames(&index, &files);
    let decisions = load_decisions(&config.paths.archive)?;
    let scan = store.scan()?;
    let organized = scan.organized_filenames();
    let pending = decisions.keys().filter(|f| !organized.contains(*f)).count();

    println!("status");
    println!("  input files: {}", files.len());
    println!("  indexed: {}", files.len() - unindexed.len());
    println!("  unindexed: {}", unindexed.len());
    println!("  batches: {}", index.batches.len());
    println!("  staged decisions: {}", decisions.len());
    println!("  pending archive: {}", pending);
    println!("  accepted: {}", scan.accepted.len());
    println!("  marked: {}", scan.marked.len());
    println!("  tossed: {}", scan.tossed.len());
    if !scan.errors.is_empty() {
        println!("  malformed sidecars: {}", scan.errors.len());
    }
    Ok(())
}
