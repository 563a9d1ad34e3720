use crate::cell::{Cell, Row};
use crate::error::{ReportError, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use log::debug;
use std::path::Path;

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            Data::Float(value) => Cell::Number(*value),
            Data::Int(value) => Cell::Number(*value as f64),
            Data::Bool(value) => Cell::Text(value.to_string()),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => Cell::DateTime(naive),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
            // Formula errors carry no usable value.
            Data::Error(_) => Cell::Empty,
        }
    }
}

/// Reads the first worksheet of an `.xlsx` report into engine rows.
///
/// This is the only place a parse can fail outright: an unreadable
/// workbook aborts with an error instead of yielding a partial tree.
pub fn read_workbook_rows<P: AsRef<Path>>(path: P) -> Result<Vec<Row>> {
    let mut workbook: Xlsx<_> = open_workbook(path.as_ref())?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ReportError::NoWorksheet)?;
    let range = workbook.worksheet_range(&sheet)?;

    let rows: Vec<Row> = range
        .rows()
        .map(|cells| Row::new(cells.iter().map(Cell::from).collect()))
        .collect();
    debug!(
        "read worksheet '{}' from {}: {} rows",
        sheet,
        path.as_ref().display(),
        rows.len()
    );
    Ok(rows)
}
