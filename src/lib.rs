//! # scanshelf
//!
//! Organizes photographed paper documents into a browsable archive.
//!
//! Capture files are grouped into shooting sessions, reviewed (accepted,
//! marked for a second look, or tossed), then copied into a
//! `<year>/<month>` tree under human-readable names with a JSON sidecar per
//! document. The sidecars are the source of truth: when a decision changes,
//! the reconciler moves files to where the decision says they belong.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────────┐
//! │  input dir   │──▶│ index/decide │──▶│ archive + sidecars │
//! │  (captures)  │   │  (staging)   │   │   <year>/<month>   │
//! └──────────────┘   └──────────────┘   └─────────┬─────────┘
//!                                                 │
//!                      ┌──────────────────────────┤
//!                      ▼                          ▼
//!                ┌───────────┐             ┌────────────┐
//!                │ reconcile │             │ names/dedupe│
//!                └───────────┘             └────────────┘
//! ```
//!
//! The pure algorithms (batch indexing, naming, planning, reconciliation,
//! clustering) live in `scanshelf-core`; this crate adds the filesystem
//! store, configuration, embedding providers and the `shelf` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fs_store`] | Filesystem `MetadataStore` |
//! | [`persist`] | JSON state files next to the archive |
//! | [`staging`] | OCR, extraction and decision staging files |
//! | [`index_cmd`] | Batch indexing and status |
//! | [`archive`] | Archive step and pool actions |
//! | [`reconcile_cmd`] | Placement repair |
//! | [`dedupe_cmd`] | Duplicate receipt detection |
//! | [`embedding`] | Embedding providers and the cosine metric |
//! | [`names`] | Name clustering, merging and suggestions |

pub mod archive;
pub mod config;
pub mod dedupe_cmd;
pub mod embedding;
pub mod fs_store;
pub mod index_cmd;
pub mod names;
pub mod persist;
pub mod reconcile_cmd;
pub mod staging;
