//! # Movement Ledger Builder
//!
//! A library for reconstructing validated per-batch stock ledgers from
//! hierarchical warehouse movement reports (1C "Ведомость по партиям"
//! exports).
//!
//! ## Core Concepts
//!
//! - **Hierarchy**: a report lists Warehouse → Product Group → Product →
//!   Batch → Document top-down, with the structure encoded positionally
//!   rather than typed. Row roles are inferred by ordered heuristics.
//! - **Two passes**: pass 1 builds the tree and defers every consumption
//!   document; pass 2 allocates the deferred quantities across each
//!   product's batches oldest-arrival-first (FIFO).
//! - **Accounting integrity**: every batch carries the identity
//!   `end = begin + in - out`, validated (never derived) within a fixed
//!   tolerance.
//! - **Best effort**: malformed rows produce recorded warnings and skips;
//!   only an unreadable workbook fails a parse.
//!
//! ## Example
//!
//! ```rust,ignore
//! use movement_ledger_builder::{KnownGroups, MovementReportParser, ParserConfig};
//!
//! let groups = KnownGroups::load_path("reference/groups.txt")?;
//! let parser = MovementReportParser::new(ParserConfig::default(), groups);
//! let report = parser.parse_path("reports/movement_2025_01.xlsx")?;
//!
//! for section in &report.sections {
//!     for product in &section.products {
//!         for batch in &product.batches {
//!             println!("{} {} -> end {}", product.name, batch.batch_code, batch.qty.end);
//!         }
//!     }
//! }
//! ```

pub mod builder;
pub mod cell;
pub mod classify;
pub mod columns;
pub mod config;
pub mod error;
pub mod fifo;
pub mod model;
pub mod reader;
pub mod validate;

pub use builder::{DeferredExpense, HierarchyBuilder};
pub use cell::{Cell, Row};
pub use classify::{classify_row, document_kind, DocKind, RowRole, CLASSIFICATION_ORDER};
pub use columns::{scan_header, HeaderScan, QtyColumns};
pub use config::{normalize_name, KnownGroups, ParserConfig};
pub use error::{ReportError, Result};
pub use fifo::{allocate_deferred, ALLOCATION_EPSILON};
pub use model::*;
pub use reader::read_workbook_rows;
pub use validate::{validate_balance, BALANCE_TOLERANCE};

use log::{debug, info};
use std::path::Path;

/// Facade over the two-pass reconstruction engine.
///
/// One parser may serve many files: each `parse_*` call owns its tree and
/// shares nothing with other calls, so whole-file invocations can run in
/// parallel from an outer caller.
pub struct MovementReportParser {
    config: ParserConfig,
    known_groups: KnownGroups,
}

impl MovementReportParser {
    pub fn new(config: ParserConfig, known_groups: KnownGroups) -> Self {
        Self {
            config,
            known_groups,
        }
    }

    /// Default vocabulary, empty known-groups set.
    pub fn with_defaults() -> Self {
        Self::new(ParserConfig::default(), KnownGroups::default())
    }

    /// Parses one report workbook. Fails only when the workbook cannot be
    /// read; every in-file problem surfaces in `report.issues` instead.
    pub fn parse_path<P: AsRef<Path>>(&self, path: P) -> Result<MovementReport> {
        info!("parsing movement report {}", path.as_ref().display());
        let rows = read_workbook_rows(path)?;
        Ok(self.parse_rows(&rows))
    }

    /// Runs both passes over in-memory rows. Total: malformed content can
    /// only add issues, never fail the parse.
    pub fn parse_rows(&self, rows: &[Row]) -> MovementReport {
        let mut builder = HierarchyBuilder::new(&self.config, &self.known_groups);
        for (index, row) in rows.iter().enumerate() {
            builder.push_row(index as u32 + 1, row);
        }
        let (mut report, deferred) = builder.finish();
        debug!(
            "pass 1: {} sections, {} deferred consumption ops, {} issues",
            report.sections.len(),
            deferred.len(),
            report.issues.len()
        );

        allocate_deferred(&mut report, &deferred);
        info!(
            "parsed report for warehouse '{}': {} groups, {} products, {} batches ({} valid / {} invalid)",
            report.warehouse,
            report.stats.groups,
            report.stats.products,
            report.stats.batches,
            report.stats.valid_batches,
            report.stats.invalid_batches
        );
        report
    }
}

/// Parses one workbook with the default vocabulary and no known groups.
pub fn parse_movement_report<P: AsRef<Path>>(path: P) -> Result<MovementReport> {
    MovementReportParser::with_defaults().parse_path(path)
}
