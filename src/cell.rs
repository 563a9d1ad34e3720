use chrono::NaiveDateTime;
use std::borrow::Cow;

/// A single spreadsheet cell as the engine sees it.
///
/// Report exports are loosely typed: a quantity may arrive as a number or as
/// localized text, a batch date as text or as a native date-time value. The
/// engine normalizes all of that behind this closed variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way it would display in the report, so the
    /// classification heuristics can treat every cell as text. Native
    /// date-time cells render in the report's `DD.MM.YYYY HH:MM:SS` form.
    pub fn display_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => Some(Cow::Borrowed(text.trim())),
            Cell::Number(value) => Some(Cow::Owned(format!("{}", value))),
            Cell::DateTime(dt) => Some(Cow::Owned(dt.format("%d.%m.%Y %H:%M:%S").to_string())),
        }
    }

    /// Numeric value of the cell, accepting the export's localized number
    /// formatting: whitespace group separators and a decimal comma.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok()
            }
            _ => None,
        }
    }
}

/// One report row. Indexing is defensive: the report does not guarantee a
/// fixed column count, so reading past the end yields [`Cell::Empty`].
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: Vec<Cell>,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Text of the first non-blank cell. This is the cell every
    /// classification rule keys off.
    pub fn lead_text(&self) -> Option<Cow<'_, str>> {
        self.cells
            .iter()
            .find(|cell| !cell.is_blank())
            .and_then(Cell::display_text)
    }

    /// Quantity at a column, absent or unparsable values reading as zero.
    pub fn number_at(&self, index: usize) -> f64 {
        self.cell(index).as_number().unwrap_or(0.0)
    }

    pub fn text_at(&self, index: usize) -> Option<Cow<'_, str>> {
        let cell = self.cell(index);
        if cell.is_blank() {
            None
        } else {
            cell.display_text()
        }
    }
}
