//! Core data models shared by every scanshelf component.
//!
//! All persisted shapes (sidecar records, staging files, `batches.json`)
//! are defined here with `serde` so the on-disk JSON stays the single
//! source of truth.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::DecisionError;

/// Outcome of human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accepted,
    Marked,
    Tossed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Marked => "marked",
            Verdict::Tossed => "tossed",
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Verdict::Accepted),
            "marked" => Ok(Verdict::Marked),
            "tossed" => Ok(Verdict::Tossed),
            other => Err(format!(
                "unknown verdict '{}': expected accepted, marked, or tossed",
                other
            )),
        }
    }
}

/// Kind of scanned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Receipt,
    Other,
    Corrupted,
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(DocumentType::Receipt),
            "other" => Ok(DocumentType::Other),
            "corrupted" => Ok(DocumentType::Corrupted),
            other => Err(format!(
                "unknown document type '{}': expected receipt, other, or corrupted",
                other
            )),
        }
    }
}

/// A reviewer's decision about one capture.
///
/// `cost` and `currency` only carry meaning for receipts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub document_type: DocumentType,
    pub name: String,
    /// `YYYY-MM-DD`, or empty when the document is undated.
    pub date: String,
    /// `HH:MM` or `HH:MM:SS`, possibly empty.
    pub time: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub currency: String,
}

impl Decision {
    /// Reject decisions that must not be persisted.
    ///
    /// An accepted receipt needs a non-zero cost and a currency.
    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.verdict != Verdict::Accepted || self.document_type != DocumentType::Receipt {
            return Ok(());
        }
        let mut missing = Vec::new();
        if self.cost == 0.0 || !self.cost.is_finite() {
            missing.push("cost");
        }
        if self.currency.trim().is_empty() {
            missing.push("currency");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DecisionError::IncompleteReceipt { missing })
        }
    }

    pub fn is_receipt(&self) -> bool {
        self.document_type == DocumentType::Receipt
    }
}

/// A line item on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub total_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub name: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherExtraction {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub title: String,
}

/// Structured fields produced by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document_type", rename_all = "lowercase")]
pub enum Extraction {
    Receipt(ReceiptExtraction),
    Other(OtherExtraction),
    Corrupted,
}

impl Extraction {
    /// The name the extractor proposed for this document.
    pub fn proposed_name(&self) -> &str {
        match self {
            Extraction::Receipt(r) => &r.name,
            Extraction::Other(o) => &o.title,
            Extraction::Corrupted => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    pub ref_type: String,
    pub coords: Vec<Vec<i64>>,
    #[serde(default)]
    pub text: Option<String>,
}

/// OCR output for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<DetectedBox>>,
    #[serde(default)]
    pub markdown: String,
    #[serde(default = "default_succeeded")]
    pub succeeded: bool,
}

fn default_succeeded() -> bool {
    true
}

/// Contents of the `ocr.json` staging file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrBatch {
    pub results: Vec<OcrResult>,
}

/// One scanning session: a contiguous run of device serials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: u32,
    pub start_datetime: String,
    pub end_datetime: String,
    pub files: BTreeMap<u32, String>,
}

/// Contents of `batches.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchIndex {
    pub batches: Vec<Batch>,
}

/// Batch id and serial of one indexed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlot {
    pub batch_id: u32,
    pub serial: u32,
}

impl BatchIndex {
    /// Map every indexed filename to its batch id and serial.
    pub fn slots(&self) -> HashMap<String, BatchSlot> {
        let mut slots = HashMap::new();
        for batch in &self.batches {
            for (serial, filename) in &batch.files {
                slots.insert(
                    filename.clone(),
                    BatchSlot {
                        batch_id: batch.batch_id,
                        serial: *serial,
                    },
                );
            }
        }
        slots
    }

    pub fn last(&self) -> Option<&Batch> {
        self.batches.last()
    }

    pub fn file_count(&self) -> usize {
        self.batches.iter().map(|b| b.files.len()).sum()
    }
}

/// A sidecar record: everything known about one archived capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub original_filename: String,
    #[serde(default)]
    pub batch_id: Option<u32>,
    #[serde(default)]
    pub serial: Option<u32>,
    #[serde(default)]
    pub review: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
}

impl ArchiveEntry {
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            batch_id: None,
            serial: None,
            review: None,
            ocr: None,
            extraction: None,
        }
    }
}

/// Name proposed by extraction and the name the reviewer confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePair {
    pub extracted: String,
    pub confirmed: String,
}

/// `name_cache.json`: one [`NamePair`] per archived filename.
pub type NameCache = BTreeMap<String, NamePair>;
