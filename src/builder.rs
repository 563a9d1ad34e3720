use crate::cell::Row;
use crate::classify::{classify_row, document_kind, is_reshuffle, is_surplus_receipt, DocKind, RowRole};
use crate::columns::{scan_header, QtyColumns};
use crate::config::{KnownGroups, ParserConfig};
use crate::model::{
    Batch, Document, IssueSeverity, MovementReport, ParseIssue, ParseStats, Product, QtySet,
    Section, SectionTally,
};
use crate::validate::validate_balance;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;

/// Warehouse name reported when the file never names one.
const UNKNOWN_WAREHOUSE: &str = "Не определен";

/// A consumption recorded during pass 1 and applied by the FIFO allocator
/// in pass 2.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredExpense {
    pub product: String,
    pub quantity: f64,
    pub document: String,
}

/// Multi-level parsing position, carried across rows.
///
/// `section`/`product`/`batch` are indices into the tree under
/// construction, so a later row can keep appending to an earlier node even
/// after intervening rows were skipped. Product context deliberately
/// survives skipped product rows and section changes (see the `Product`
/// transition).
#[derive(Debug, Clone)]
struct ParseContext {
    warehouse: Option<String>,
    section: Option<usize>,
    /// (section index, product index)
    product: Option<(usize, usize)>,
    /// Batch index within the context product.
    batch: Option<usize>,
    columns: QtyColumns,
    found_header: bool,
}

/// Pass 1: depth-first sequential state machine over classified rows.
///
/// Builds the Warehouse → Group → Product → Batch → Document tree in row
/// order, never looking ahead. All consumption documents are deferred; the
/// tree is handed to the FIFO allocator together with the deferred queue.
pub struct HierarchyBuilder<'a> {
    config: &'a ParserConfig,
    known_groups: &'a KnownGroups,
    ctx: ParseContext,
    sections: Vec<Section>,
    deferred: Vec<DeferredExpense>,
    stats: ParseStats,
    issues: Vec<ParseIssue>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(config: &'a ParserConfig, known_groups: &'a KnownGroups) -> Self {
        Self {
            config,
            known_groups,
            ctx: ParseContext {
                warehouse: None,
                section: None,
                product: None,
                batch: None,
                columns: config.fallback_columns,
                found_header: false,
            },
            sections: Vec::new(),
            deferred: Vec::new(),
            stats: ParseStats::default(),
            issues: Vec::new(),
        }
    }

    /// Feeds one report row through the state machine. `row_number` is the
    /// 1-based position in the file, used for diagnostics only.
    pub fn push_row(&mut self, row_number: u32, row: &Row) {
        match classify_row(row, self.config, self.known_groups) {
            RowRole::Empty | RowRole::Meta => {}
            RowRole::Header => self.on_header(row_number, row),
            RowRole::Warehouse => self.on_warehouse(row),
            RowRole::Group => self.on_group(row),
            RowRole::Product => self.on_product(row_number, row),
            RowRole::Batch => self.on_batch(row_number, row),
            RowRole::Document => self.on_document(row_number, row),
        }
    }

    /// Consumes the builder, yielding the tree and the deferred
    /// consumption queue for pass 2.
    pub fn finish(self) -> (MovementReport, Vec<DeferredExpense>) {
        let report = MovementReport {
            warehouse: self
                .ctx
                .warehouse
                .unwrap_or_else(|| UNKNOWN_WAREHOUSE.to_string()),
            sections: self.sections,
            stats: self.stats,
            issues: self.issues,
        };
        (report, self.deferred)
    }

    fn on_header(&mut self, row_number: u32, row: &Row) {
        if self.ctx.found_header {
            return;
        }
        let scan = scan_header(row, self.config);
        if !scan.is_complete() {
            self.warning(
                Some(row_number),
                format!(
                    "header row resolved partially ({:?}); unresolved quantity columns use defaults {:?}",
                    scan, self.config.fallback_columns
                ),
            );
        }
        self.ctx.columns = scan.columns_or(self.config.fallback_columns);
        self.ctx.found_header = true;
    }

    fn on_warehouse(&mut self, row: &Row) {
        self.stats.warehouses += 1;
        let name = row.lead_text().unwrap_or_default().into_owned();
        // First warehouse row wins; later ones are counted and ignored.
        if self.ctx.warehouse.is_none() {
            self.ctx.warehouse = Some(name);
        }
    }

    fn on_group(&mut self, row: &Row) {
        let name = row.lead_text().unwrap_or_default().into_owned();
        self.sections.push(Section {
            name,
            products: Vec::new(),
            tally: SectionTally::default(),
        });
        self.ctx.section = Some(self.sections.len() - 1);
        self.ctx.batch = None;
        self.stats.groups += 1;
    }

    fn on_product(&mut self, row_number: u32, row: &Row) {
        let name = row.lead_text().unwrap_or_default().into_owned();
        let lower = name.to_lowercase();
        if self
            .config
            .invalid_product_markers
            .iter()
            .any(|marker| lower.contains(marker.as_str()))
        {
            // Keep the previous valid product context for following rows.
            self.warning(
                Some(row_number),
                format!("skipping rejected product row '{}'", name),
            );
            return;
        }

        let Some(section_idx) = self.ctx.section else {
            self.warning(
                Some(row_number),
                format!("product '{}' appears outside any group; row skipped", name),
            );
            return;
        };

        let summary = self.read_quantities(row);
        let section = &mut self.sections[section_idx];
        section.products.push(Product {
            name,
            quantity_summary: summary,
            batches: Vec::new(),
        });
        section.tally.products += 1;
        self.stats.products += 1;
        self.ctx.product = Some((section_idx, section.products.len() - 1));
        self.ctx.batch = None;
    }

    fn on_batch(&mut self, row_number: u32, row: &Row) {
        let Some((section_idx, product_idx)) = self.ctx.product else {
            self.warning(
                Some(row_number),
                "batch row without product context; row skipped".to_string(),
            );
            return;
        };

        let code = row.lead_text().unwrap_or_default().into_owned();
        let arrival = self.parse_arrival(row_number, &code);
        let qty = self.read_quantities(row);
        let validation = validate_balance(qty.begin, qty.qty_in, qty.qty_out, qty.end);
        if validation.valid {
            self.stats.valid_batches += 1;
        } else {
            self.stats.invalid_batches += 1;
        }

        let unit = row
            .text_at(self.config.unit_column)
            .map(|u| u.into_owned())
            .unwrap_or_else(|| self.config.default_unit.clone());

        let section = &mut self.sections[section_idx];
        section.products[product_idx].batches.push(Batch {
            arrival_date: arrival.date(),
            arrival_time: arrival.time(),
            batch_code: code,
            qty,
            qty_raw: qty,
            unit,
            documents: Vec::new(),
            validation,
        });
        section.tally.batches += 1;
        self.stats.batches += 1;
        self.ctx.batch = Some(section.products[product_idx].batches.len() - 1);
    }

    fn on_document(&mut self, row_number: u32, row: &Row) {
        let Some((section_idx, product_idx)) = self.ctx.product else {
            self.warning(
                Some(row_number),
                "document row without product context; row skipped".to_string(),
            );
            return;
        };

        let name = row.lead_text().unwrap_or_default().into_owned();
        let kind = document_kind(&name, self.config);
        let qty_in = row.number_at(self.ctx.columns.qty_in);
        let qty_out = row.number_at(self.ctx.columns.qty_out);

        match kind {
            DocKind::Receipt => self.stats.receipt_docs += 1,
            DocKind::Expense => self.stats.expense_docs += 1,
            DocKind::Unknown => {}
        }
        let reshuffle = is_reshuffle(&name, self.config);
        if reshuffle {
            self.stats.reshuffle_docs += 1;
        }
        self.sections[section_idx].tally.documents += 1;

        let mut handled = false;

        // Dual-effect receipt side: the addition lands on the batch that
        // arrived last, not on the batch the cursor happens to be in.
        if qty_in > 0.0 && (reshuffle || is_surplus_receipt(&name, self.config)) {
            let product = &mut self.sections[section_idx].products[product_idx];
            match product.batches.iter_mut().max_by_key(|batch| batch.arrival()) {
                Some(batch) => {
                    batch.qty.qty_in += qty_in;
                    batch.qty.end += qty_in;
                }
                None => {
                    let product_name = product.name.clone();
                    self.warning(
                        Some(row_number),
                        format!(
                            "adjustment receipt '{}' for product '{}' with no batches; quantity {} not applied",
                            name, product_name, qty_in
                        ),
                    );
                }
            }
            handled = true;
        }

        // Consumption is never applied in row order; it is deferred and
        // allocated oldest-batch-first in pass 2.
        if kind == DocKind::Expense && qty_out > 0.0 {
            let product_name = self.sections[section_idx].products[product_idx].name.clone();
            self.deferred.push(DeferredExpense {
                product: product_name,
                quantity: qty_out,
                document: name.clone(),
            });
            handled = true;
        }

        if !handled {
            if let Some(batch_idx) = self.ctx.batch {
                self.sections[section_idx].products[product_idx].batches[batch_idx]
                    .documents
                    .push(Document {
                        doc_type: kind,
                        name,
                        qty_in,
                        qty_out,
                    });
            }
        }
    }

    fn read_quantities(&self, row: &Row) -> QtySet {
        let columns = self.ctx.columns;
        QtySet {
            begin: row.number_at(columns.begin),
            qty_in: row.number_at(columns.qty_in),
            qty_out: row.number_at(columns.qty_out),
            end: row.number_at(columns.end),
        }
    }

    /// Arrival timestamp from the batch row's leading token: full
    /// date-time form first, date-only form second, "now" as the last
    /// resort with a warning.
    fn parse_arrival(&mut self, row_number: u32, token: &str) -> NaiveDateTime {
        if let Some(head) = token.get(..19) {
            if let Ok(dt) = NaiveDateTime::parse_from_str(head, "%d.%m.%Y %H:%M:%S") {
                return dt;
            }
        }
        if let Some(head) = token.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(head, "%d.%m.%Y") {
                return date.and_time(NaiveTime::MIN);
            }
        }
        self.warning(
            Some(row_number),
            format!("unparsable batch arrival token '{}'; using current time", token),
        );
        chrono::Local::now().naive_local()
    }

    fn warning(&mut self, row: Option<u32>, message: String) {
        warn!("row {:?}: {}", row, message);
        self.issues.push(ParseIssue {
            row,
            severity: IssueSeverity::Warning,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn text_row(cells: &[&str]) -> Row {
        Row::new(cells.iter().map(|c| Cell::Text(c.to_string())).collect())
    }

    /// A row with its lead text in column 0 and quantities in the default
    /// columns 7..=10, matching the report layout the fallback offsets
    /// assume.
    fn qty_row(lead: &str, begin: f64, qty_in: f64, qty_out: f64, end: f64) -> Row {
        let mut cells = vec![Cell::Text(lead.to_string())];
        cells.resize(7, Cell::Empty);
        cells.push(Cell::Number(begin));
        cells.push(Cell::Number(qty_in));
        cells.push(Cell::Number(qty_out));
        cells.push(Cell::Number(end));
        Row::new(cells)
    }

    fn build(rows: &[Row]) -> (MovementReport, Vec<DeferredExpense>) {
        let config = ParserConfig::default();
        let groups = KnownGroups::from_names(["напитки", "сыры"]);
        let mut builder = HierarchyBuilder::new(&config, &groups);
        for (idx, row) in rows.iter().enumerate() {
            builder.push_row(idx as u32 + 1, row);
        }
        builder.finish()
    }

    #[test]
    fn test_basic_hierarchy_with_deferred_expense() {
        let (report, deferred) = build(&[
            text_row(&["Склад №1 (осн.)"]),
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 100.0, 0.0, 100.0),
            qty_row("01.01.2025 10:00:00", 0.0, 100.0, 0.0, 100.0),
            qty_row("Продажи", 0.0, 0.0, 30.0, 0.0),
        ]);

        assert_eq!(report.warehouse, "Склад №1 (осн.)");
        assert_eq!(report.sections.len(), 1);
        let product = &report.sections[0].products[0];
        assert_eq!(product.name, "Пиво А");
        assert_eq!(product.quantity_summary.qty_in, 100.0);
        assert_eq!(product.batches.len(), 1);

        let batch = &product.batches[0];
        assert_eq!(batch.batch_code, "01.01.2025 10:00:00");
        assert_eq!(
            batch.arrival_date,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(batch.arrival_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(batch.validation.valid);
        // Pass 1 defers the consumption instead of touching the batch.
        assert_eq!(batch.qty.qty_out, 0.0);
        assert_eq!(
            deferred,
            vec![DeferredExpense {
                product: "Пиво А".to_string(),
                quantity: 30.0,
                document: "Продажи".to_string(),
            }]
        );

        assert_eq!(report.stats.warehouses, 1);
        assert_eq!(report.stats.groups, 1);
        assert_eq!(report.stats.products, 1);
        assert_eq!(report.stats.batches, 1);
        assert_eq!(report.stats.valid_batches, 1);
        assert_eq!(report.stats.expense_docs, 1);
    }

    #[test]
    fn test_warehouse_first_wins_but_all_counted() {
        let (report, _) = build(&[
            text_row(&["Склад №1 (осн.)"]),
            text_row(&["Склад №2 (доп.)"]),
        ]);
        assert_eq!(report.warehouse, "Склад №1 (осн.)");
        assert_eq!(report.stats.warehouses, 2);
    }

    #[test]
    fn test_missing_warehouse_gets_placeholder() {
        let (report, _) = build(&[text_row(&["напитки"])]);
        assert_eq!(report.warehouse, "Не определен");
    }

    #[test]
    fn test_orphan_document_single_warning_no_mutation() {
        let (report, deferred) = build(&[qty_row("Продажи", 0.0, 0.0, 30.0, 0.0)]);
        assert!(report.sections.is_empty());
        assert!(deferred.is_empty());
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_orphan_batch_and_groupless_product_are_skipped() {
        let (report, _) = build(&[
            qty_row("01.01.2025 10:00:00", 0.0, 10.0, 0.0, 10.0),
            qty_row("Пиво А", 0.0, 10.0, 0.0, 10.0),
        ]);
        assert!(report.sections.is_empty());
        assert_eq!(report.stats.batches, 0);
        assert_eq!(report.stats.products, 0);
        assert_eq!(report.warnings().count(), 2);
    }

    #[test]
    fn test_rejected_product_row_preserves_previous_context() {
        let (report, _) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 10.0, 0.0, 10.0),
            text_row(&["Пиво Б, помечен на удаление"]),
            qty_row("02.01.2025 09:00:00", 0.0, 10.0, 0.0, 10.0),
        ]);

        // The invalid product is skipped with a warning...
        assert_eq!(report.stats.products, 1);
        assert_eq!(report.warnings().count(), 1);
        // ...and the following batch still lands under the previous product.
        assert_eq!(report.sections[0].products[0].batches.len(), 1);
    }

    #[test]
    fn test_batch_date_fallback_emits_warning() {
        let (report, _) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 10.0, 0.0, 10.0),
            qty_row("31.02.2025 10:00:00", 0.0, 10.0, 0.0, 10.0),
        ]);

        // The token matches the date shape but is not a real date; the
        // batch is still created, stamped "now".
        assert_eq!(report.stats.batches, 1);
        assert!(report
            .warnings()
            .any(|issue| issue.message.contains("unparsable batch arrival")));
    }

    #[test]
    fn test_date_only_batch_token() {
        let (report, _) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 10.0, 0.0, 10.0),
            qty_row("05.01.2025", 0.0, 10.0, 0.0, 10.0),
        ]);
        let batch = &report.sections[0].products[0].batches[0];
        assert_eq!(batch.arrival_date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(batch.arrival_time, NaiveTime::MIN);
        assert!(report.warnings().next().is_none());
    }

    #[test]
    fn test_invalid_batch_counted_and_flagged() {
        let (report, _) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 100.0, 0.0, 95.0),
            qty_row("01.01.2025 10:00:00", 0.0, 100.0, 0.0, 95.0),
        ]);
        assert_eq!(report.stats.invalid_batches, 1);
        assert_eq!(report.stats.valid_batches, 0);
        let batch = &report.sections[0].products[0].batches[0];
        assert!(!batch.validation.valid);
        assert!((batch.validation.diff - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reshuffle_receipt_lands_on_most_recent_batch() {
        let (report, deferred) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 150.0, 0.0, 150.0),
            qty_row("02.01.2025 09:00:00", 0.0, 50.0, 0.0, 50.0),
            qty_row("01.01.2025 10:00:00", 0.0, 100.0, 0.0, 100.0),
            qty_row("Перемещение товаров №7", 0.0, 20.0, 0.0, 0.0),
        ]);

        assert!(deferred.is_empty());
        let batches = &report.sections[0].products[0].batches;
        // Applied to the batch that arrived last (row order differs).
        assert_eq!(batches[0].qty.qty_in, 70.0);
        assert_eq!(batches[0].qty.end, 70.0);
        assert_eq!(batches[1].qty.qty_in, 100.0);
        assert_eq!(report.stats.reshuffle_docs, 1);
        assert_eq!(report.stats.expense_docs, 1);
    }

    #[test]
    fn test_reshuffle_receipt_with_no_batches_warns_only() {
        let (report, deferred) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 20.0, 0.0, 20.0),
            qty_row("Перемещение товаров №7", 0.0, 20.0, 0.0, 0.0),
        ]);

        assert!(deferred.is_empty());
        assert!(report.sections[0].products[0].batches.is_empty());
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.stats.reshuffle_docs, 1);
    }

    #[test]
    fn test_reshuffle_with_out_side_is_deferred() {
        let (_, deferred) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 100.0, 0.0, 100.0),
            qty_row("01.01.2025 10:00:00", 0.0, 100.0, 0.0, 100.0),
            qty_row("Перемещение товаров №8", 0.0, 0.0, 15.0, 0.0),
        ]);
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].quantity, 15.0);
    }

    #[test]
    fn test_unknown_document_attaches_for_provenance_only() {
        let (report, deferred) = build(&[
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 100.0, 0.0, 100.0),
            qty_row("01.01.2025 10:00:00", 0.0, 100.0, 0.0, 100.0),
            qty_row("Инвентаризация №3", 0.0, 0.0, 5.0, 0.0),
        ]);

        assert!(deferred.is_empty());
        let batch = &report.sections[0].products[0].batches[0];
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.documents[0].doc_type, DocKind::Unknown);
        assert_eq!(batch.documents[0].qty_out, 5.0);
        // Provenance only: quantities untouched.
        assert_eq!(batch.qty.qty_out, 0.0);
    }

    #[test]
    fn test_header_row_overrides_quantity_columns() {
        let header = text_row(&[
            "Номенклатура",
            "Начальный остаток",
            "Приход",
            "Расход",
            "Конечный остаток",
        ]);
        let mut product = vec![Cell::Text("Пиво А".to_string())];
        product.extend([
            Cell::Number(0.0),
            Cell::Number(100.0),
            Cell::Number(0.0),
            Cell::Number(100.0),
        ]);

        let (report, _) = build(&[
            header,
            text_row(&["напитки"]),
            Row::new(product),
        ]);

        let summary = report.sections[0].products[0].quantity_summary;
        assert_eq!(summary.qty_in, 100.0);
        assert_eq!(summary.end, 100.0);
        assert!(report.warnings().next().is_none());
    }

    #[test]
    fn test_partial_header_warns_once_and_uses_defaults() {
        let (report, _) = build(&[
            text_row(&["Номенклатура", "Приход", "Расход"]),
            text_row(&["Номенклатура", "Приход", "Расход"]),
            text_row(&["напитки"]),
            qty_row("Пиво А", 0.0, 100.0, 0.0, 100.0),
        ]);

        // Second header row is a no-op; diagnostic emitted once.
        assert_eq!(report.warnings().count(), 1);
        // begin/end fell back to defaults, so the default-layout row reads.
        let summary = report.sections[0].products[0].quantity_summary;
        assert_eq!(summary.begin, 0.0);
        assert_eq!(summary.end, 100.0);
    }
}
