//! Staging files written by the upstream OCR, extraction and review steps.
//!
//! `ocr.json`, `extractions.json` and `decisions.json` live in the archive
//! root until every decided capture has been archived.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use scanshelf_core::models::{Decision, Extraction, OcrBatch, OcrResult};

use crate::config::Config;
use crate::persist::{load_json, remove_if_exists, save_json};

pub const OCR_FILE: &str = "ocr.json";
pub const EXTRACTIONS_FILE: &str = "extractions.json";
pub const DECISIONS_FILE: &str = "decisions.json";

/// Everything currently staged for archiving.
#[derive(Debug, Default)]
pub struct Staging {
    pub ocr: OcrBatch,
    pub extractions: BTreeMap<String, Extraction>,
    pub decisions: BTreeMap<String, Decision>,
}

impl Staging {
    pub fn load(root: &Path) -> Result<Self> {
        Ok(Self {
            ocr: load_json(&root.join(OCR_FILE))?,
            extractions: load_json(&root.join(EXTRACTIONS_FILE))?,
            decisions: load_json(&root.join(DECISIONS_FILE))?,
        })
    }

    pub fn ocr_for(&self, filename: &str) -> Option<&OcrResult> {
        self.ocr.results.iter().find(|r| r.filename == filename)
    }
}

pub fn load_decisions(root: &Path) -> Result<BTreeMap<String, Decision>> {
    load_json(&root.join(DECISIONS_FILE))
}

/// Validate and store a decision in `decisions.json`.
///
/// An incomplete receipt is rejected and nothing is written.
pub fn record_decision(root: &Path, filename: &str, decision: Decision) -> Result<()> {
    decision.validate()?;
    let path = root.join(DECISIONS_FILE);
    let mut decisions: BTreeMap<String, Decision> = load_json(&path)?;
    decisions.insert(filename.to_string(), decision);
    save_json(&path, &decisions)?;
    info!(filename = %filename, "decision recorded");
    Ok(())
}

/// `shelf decide`: record one decision for a capture in the input folder.
pub fn run_decide(config: &Config, filename: &str, decision: Decision) -> Result<()> {
    let source = config.paths.input.join(filename);
    if !source.is_file() {
        bail!("capture not found: {}", source.display());
    }
    let verdict = decision.verdict;
    record_decision(&config.paths.archive, filename, decision)?;
    println!("decided: {} ({})", filename, verdict.as_str());
    Ok(())
}

/// Remove all staging files.
pub fn clear_staging(root: &Path) -> Result<()> {
    for name in [OCR_FILE, EXTRACTIONS_FILE, DECISIONS_FILE] {
        remove_if_exists(&root.join(name))?;
    }
    info!("staging files removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanshelf_core::error::DecisionError;
    use scanshelf_core::models::{DocumentType, Verdict};
    use tempfile::TempDir;

    fn receipt(cost: f64, currency: &str) -> Decision {
        Decision {
            verdict: Verdict::Accepted,
            document_type: DocumentType::Receipt,
            name: "Cafe".to_string(),
            date: "2024-03-05".to_string(),
            time: "10:00".to_string(),
            cost,
            currency: currency.to_string(),
        }
    }

    #[test]
    fn test_record_decision_persists() {
        let tmp = TempDir::new().unwrap();
        record_decision(tmp.path(), "a.jpg", receipt(4.5, "EUR")).unwrap();
        let decisions = load_decisions(tmp.path()).unwrap();
        assert_eq!(decisions["a.jpg"].cost, 4.5);
    }

    #[test]
    fn test_incomplete_receipt_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let err = record_decision(tmp.path(), "a.jpg", receipt(0.0, "")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecisionError>(),
            Some(&DecisionError::IncompleteReceipt {
                missing: vec!["cost", "currency"]
            })
        );
        assert_eq!(err.to_string(), "Receipt requires: cost, currency");
        assert!(!tmp.path().join(DECISIONS_FILE).exists());
    }

    #[test]
    fn test_load_and_clear() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(OCR_FILE),
            r#"{"results": [{"filename": "a.jpg", "raw": "r", "markdown": "m"}]}"#,
        )
        .unwrap();
        std::fs::write(
            tmp.path().join(EXTRACTIONS_FILE),
            r#"{"a.jpg": {"document_type": "corrupted"}}"#,
        )
        .unwrap();
        let staging = Staging::load(tmp.path()).unwrap();
        assert!(staging.ocr_for("a.jpg").is_some_and(|r| r.succeeded));
        assert_eq!(staging.extractions["a.jpg"], Extraction::Corrupted);

        clear_staging(tmp.path()).unwrap();
        assert!(!tmp.path().join(OCR_FILE).exists());
        assert!(!tmp.path().join(EXTRACTIONS_FILE).exists());
    }
}
