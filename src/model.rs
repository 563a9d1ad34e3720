use crate::classify::DocKind;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Quantity ledger of one batch or one product summary:
/// opening balance, receipts, consumption, closing balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QtySet {
    pub begin: f64,
    #[serde(rename = "in")]
    pub qty_in: f64,
    #[serde(rename = "out")]
    pub qty_out: f64,
    pub end: f64,
}

/// Result of checking the accounting identity `end == begin + in - out`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub valid: bool,
    pub diff: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A movement document attributed to a batch. Quantities are informational
/// provenance; documents never drive ledger mutation on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Document {
    pub doc_type: DocKind,
    pub name: String,
    #[serde(rename = "in")]
    pub qty_in: f64,
    #[serde(rename = "out")]
    pub qty_out: f64,
}

/// A discrete lot of a product received at a specific time, tracked
/// independently for stock purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Batch {
    pub arrival_date: NaiveDate,
    pub arrival_time: NaiveTime,
    /// Raw leading token of the batch row; display and pairing key.
    pub batch_code: String,
    /// Working quantities, mutated only by FIFO allocation and
    /// reshuffle-receipt handling.
    pub qty: QtySet,
    /// As-parsed quantities, kept for audit.
    pub qty_raw: QtySet,
    pub unit: String,
    pub documents: Vec<Document>,
    pub validation: ValidationResult,
}

impl Batch {
    pub fn arrival(&self) -> NaiveDateTime {
        self.arrival_date.and_time(self.arrival_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Product {
    pub name: String,
    /// Quantities taken verbatim from the product's own summary row.
    pub quantity_summary: QtySet,
    pub batches: Vec<Batch>,
}

/// Entities created under a section while parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SectionTally {
    pub products: u32,
    pub batches: u32,
    pub documents: u32,
}

/// A product group of the report hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub name: String,
    pub products: Vec<Product>,
    pub tally: SectionTally,
}

/// Structural and validation counters for one parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParseStats {
    pub warehouses: u32,
    pub groups: u32,
    pub products: u32,
    pub batches: u32,
    pub receipt_docs: u32,
    pub expense_docs: u32,
    pub reshuffle_docs: u32,
    pub valid_batches: u32,
    pub invalid_batches: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A non-fatal problem recorded during parsing or allocation. Issues are
/// part of the output so callers can assert on them instead of scraping
/// logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParseIssue {
    /// 1-based report row, when the issue is tied to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    pub severity: IssueSeverity,
    pub message: String,
}

/// The reconstructed ledger tree for one report file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MovementReport {
    pub warehouse: String,
    pub sections: Vec<Section>,
    pub stats: ParseStats,
    pub issues: Vec<ParseIssue>,
}

impl MovementReport {
    /// First product with the given name across all sections, in section
    /// order. Product names are assumed unique per run; when two sections
    /// carry the same name only the first encountered is returned.
    pub fn find_product_mut(&mut self, name: &str) -> Option<&mut Product> {
        self.sections
            .iter_mut()
            .flat_map(|section| section.products.iter_mut())
            .find(|product| product.name == name)
    }

    pub fn find_product(&self, name: &str) -> Option<&Product> {
        self.sections
            .iter()
            .flat_map(|section| section.products.iter())
            .find(|product| product.name == name)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ParseIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ParseIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
    }
}
