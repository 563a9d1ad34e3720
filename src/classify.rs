use crate::cell::Row;
use crate::config::{normalize_name, KnownGroups, ParserConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structural role of one report row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RowRole {
    Empty,
    Meta,
    Header,
    Warehouse,
    Group,
    Product,
    Batch,
    Document,
}

/// Rule precedence for row classification; first match wins. `Empty` is
/// handled before the table (an all-blank row has no lead cell to inspect)
/// and `Product` is the unconditional final rule.
pub const CLASSIFICATION_ORDER: [RowRole; 7] = [
    RowRole::Meta,
    RowRole::Header,
    RowRole::Document,
    RowRole::Batch,
    RowRole::Group,
    RowRole::Warehouse,
    RowRole::Product,
];

/// Labels a raw row by structural role.
///
/// Pure function of the row and the known-groups set: classifying the same
/// row twice always yields the same role.
pub fn classify_row(row: &Row, config: &ParserConfig, known_groups: &KnownGroups) -> RowRole {
    let Some(lead) = row.lead_text() else {
        return RowRole::Empty;
    };
    let lower = normalize_name(&lead);

    for role in CLASSIFICATION_ORDER {
        let hit = match role {
            RowRole::Empty => false,
            RowRole::Meta => config.meta_markers.iter().any(|m| lower.contains(m.as_str())),
            RowRole::Header => config.header_labels.iter().any(|h| lower == *h),
            RowRole::Document => document_kind(&lead, config) != DocKind::Unknown,
            RowRole::Batch => has_date_prefix(&lead),
            RowRole::Group => known_groups.contains(&lead),
            RowRole::Warehouse => lead.contains('(') && lead.contains(')'),
            RowRole::Product => true,
        };
        if hit {
            return role;
        }
    }

    RowRole::Product
}

/// Strict `DD.MM.YYYY` prefix check, the shape every batch row's arrival
/// token starts with.
fn has_date_prefix(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    [0, 1, 3, 4, 6, 7, 8, 9]
        .iter()
        .all(|&i| bytes[i].is_ascii_digit())
        && bytes[2] == b'.'
        && bytes[5] == b'.'
}

/// Ledger effect of a document, derived from its display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Receipt,
    Expense,
    Unknown,
}

/// Maps a document display name to its ledger effect by ordered,
/// case-insensitive prefix match: receipt table first, then expense table.
/// Unmatched names are `Unknown` and never move quantities.
pub fn document_kind(name: &str, config: &ParserConfig) -> DocKind {
    let lower = normalize_name(name);
    if config.receipt_prefixes.iter().any(|p| lower.starts_with(p.as_str())) {
        return DocKind::Receipt;
    }
    if config.expense_prefixes.iter().any(|p| lower.starts_with(p.as_str())) {
        return DocKind::Expense;
    }
    DocKind::Unknown
}

/// True for the dual-effect reshuffle document (an expense-table name that
/// can also carry a receipt side into another batch).
pub fn is_reshuffle(name: &str, config: &ParserConfig) -> bool {
    normalize_name(name).starts_with(config.reshuffle_prefix.as_str())
}

/// True for the surplus-receipt adjustment document.
pub fn is_surplus_receipt(name: &str, config: &ParserConfig) -> bool {
    normalize_name(name).starts_with(config.surplus_prefix.as_str())
}
