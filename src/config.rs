use crate::columns::QtyColumns;
use crate::error::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Report vocabulary and layout fallbacks.
///
/// The defaults carry the vocabulary of a 1C goods-movement report
/// (`Ведомость по партиям товаров на складах`). Deployments facing a
/// differently-worded export can override any table from a JSON file
/// without touching code; classification rule *order* is fixed either way.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Marker phrases of report-title and filter-parameter rows.
    pub meta_markers: Vec<String>,
    /// Exact (lowercased) first-cell labels of the column header row.
    pub header_labels: Vec<String>,
    /// Name prefixes of receipt-side documents.
    pub receipt_prefixes: Vec<String>,
    /// Name prefixes of expense-side documents.
    pub expense_prefixes: Vec<String>,
    /// Expense prefix that denotes the dual-effect reshuffle document.
    pub reshuffle_prefix: String,
    /// Receipt prefix that denotes a surplus-receipt adjustment.
    pub surplus_prefix: String,
    /// Markers of rejected product rows (deletion marks, dangling refs).
    pub invalid_product_markers: Vec<String>,
    /// Header keywords for the opening-balance column.
    pub begin_keywords: Vec<String>,
    /// Header keywords for the receipts column.
    pub in_keywords: Vec<String>,
    /// Header keywords for the consumption column.
    pub out_keywords: Vec<String>,
    /// Header keywords for the closing-balance column.
    pub end_keywords: Vec<String>,
    /// Column offsets used when the header row cannot be resolved.
    pub fallback_columns: QtyColumns,
    /// Column carrying the unit of measure on batch rows.
    pub unit_column: usize,
    /// Unit assumed when the unit cell is blank.
    pub default_unit: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            meta_markers: strings(&["ведомость", "отбор", "параметры", "период"]),
            header_labels: strings(&[
                "номенклатура",
                "начальный остаток",
                "приход",
                "расход",
                "конечный остаток",
            ]),
            receipt_prefixes: strings(&[
                "поступление",
                "приходный ордер",
                "оприходование",
                "возврат от покупателя",
            ]),
            expense_prefixes: strings(&[
                "реализация",
                "продажи",
                "списание",
                "расходный ордер",
                "перемещение",
            ]),
            reshuffle_prefix: "перемещение".to_string(),
            surplus_prefix: "оприходование".to_string(),
            invalid_product_markers: strings(&["помечен на удаление", "объект не найден"]),
            begin_keywords: strings(&["начальный остаток", "нач. остаток"]),
            in_keywords: strings(&["приход"]),
            out_keywords: strings(&["расход"]),
            end_keywords: strings(&["конечный остаток", "кон. остаток"]),
            fallback_columns: QtyColumns {
                begin: 7,
                qty_in: 8,
                qty_out: 9,
                end: 10,
            },
            unit_column: 11,
            default_unit: "шт".to_string(),
        }
    }
}

/// Trimmed, lowercased form used for every name comparison in the engine.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Read-only set of known product-group names.
///
/// Loaded once from a reference resource maintained next to the reports; the
/// engine runs with an empty set when the resource is unavailable, at the
/// cost of group rows classifying as warehouses or products. Safe to share
/// across parallel whole-file parses.
#[derive(Debug, Clone, Default)]
pub struct KnownGroups {
    names: HashSet<String>,
}

impl KnownGroups {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| normalize_name(name.as_ref()))
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Loads the reference list: plain text, one group name per line,
    /// `#`-prefixed lines ignored.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_names(
            contents.lines().filter(|line| !line.trim_start().starts_with('#')),
        ))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
