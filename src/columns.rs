use crate::cell::Row;
use crate::config::ParserConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Positions of the four quantity columns in the report grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QtyColumns {
    pub begin: usize,
    #[serde(rename = "in")]
    pub qty_in: usize,
    #[serde(rename = "out")]
    pub qty_out: usize,
    pub end: usize,
}

/// Outcome of scanning a header row for the quantity columns.
///
/// The mapping is partial: exports sometimes merge or retitle header cells,
/// so any field may come back unresolved and fall through to the configured
/// fallback offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderScan {
    pub begin: Option<usize>,
    pub qty_in: Option<usize>,
    pub qty_out: Option<usize>,
    pub end: Option<usize>,
}

impl HeaderScan {
    pub fn is_complete(&self) -> bool {
        self.begin.is_some() && self.qty_in.is_some() && self.qty_out.is_some() && self.end.is_some()
    }

    /// Resolved columns, with unresolved fields taken from `fallback`.
    pub fn columns_or(&self, fallback: QtyColumns) -> QtyColumns {
        QtyColumns {
            begin: self.begin.unwrap_or(fallback.begin),
            qty_in: self.qty_in.unwrap_or(fallback.qty_in),
            qty_out: self.qty_out.unwrap_or(fallback.qty_out),
            end: self.end.unwrap_or(fallback.end),
        }
    }
}

/// Scans the header row's cells for the configured keyword substrings,
/// recording the first matching column per field.
pub fn scan_header(row: &Row, config: &ParserConfig) -> HeaderScan {
    let mut scan = HeaderScan::default();

    for column in 0..row.len() {
        let Some(text) = row.text_at(column) else {
            continue;
        };
        let lower = text.to_lowercase();

        let record = |slot: &mut Option<usize>, keywords: &[String]| {
            if slot.is_none() && keywords.iter().any(|k| lower.contains(k.as_str())) {
                *slot = Some(column);
            }
        };

        // Balance keywords first: "начальный остаток" must not be claimed
        // by the bare "приход"/"расход" substrings.
        record(&mut scan.begin, &config.begin_keywords);
        record(&mut scan.end, &config.end_keywords);
        if scan.begin != Some(column) && scan.end != Some(column) {
            record(&mut scan.qty_in, &config.in_keywords);
            record(&mut scan.qty_out, &config.out_keywords);
        }
    }

    scan
}
