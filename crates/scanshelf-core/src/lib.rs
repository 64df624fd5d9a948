//! # scanshelf core
//!
//! Pure logic for scanshelf: data models, capture-filename parsing, batch
//! indexing, archive naming, destination planning, reconciliation, duplicate
//! detection, and name clustering.
//!
//! Algorithms here never touch the filesystem directly. Anything that reads
//! or moves archive files goes through the [`store::MetadataStore`] trait,
//! which the `scanshelf` application crate implements on top of a real
//! directory tree and which [`store::memory::InMemoryStore`] implements for
//! tests.

pub mod capture;
pub mod cluster;
pub mod dedupe;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod models;
pub mod naming;
pub mod normalize;
pub mod planner;
pub mod reconcile;
pub mod store;
