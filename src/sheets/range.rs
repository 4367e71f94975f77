// src/sheets/range.rs
// A1-style cell addressing for the spreadsheet backend

use std::fmt;

/// Column holding the row identifier.
pub const IDENTIFIER_COLUMN: &str = "A";

/// Columns covered by a full-sheet fetch.
pub const FETCH_COLUMNS: (&str, &str) = ("A", "Z");

/// A single cell, column letters plus 1-based sheet row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub column: String,
    pub row: usize,
}

impl CellAddress {
    pub fn new(column: impl Into<String>, row: usize) -> Self {
        Self {
            column: column.into(),
            row,
        }
    }

    pub fn identifier_cell(row: usize) -> Self {
        Self::new(IDENTIFIER_COLUMN, row)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// Convert a zero-based column index into letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Quote a sheet name for use in a range when it contains a space, `!` or `'`.
/// Embedded single quotes are doubled.
pub fn quote_sheet_name(sheet_name: &str) -> String {
    if sheet_name.contains(' ') || sheet_name.contains('!') || sheet_name.contains('\'') {
        format!("'{}'", sheet_name.replace('\'', "''"))
    } else {
        sheet_name.to_string()
    }
}

pub fn a1_cell(sheet_name: &str, cell: &CellAddress) -> String {
    format!("{}!{}", quote_sheet_name(sheet_name), cell)
}

/// Range used to pull every populated row of a sheet.
pub fn full_sheet_range(sheet_name: &str) -> String {
    format!(
        "{}!{}:{}",
        quote_sheet_name(sheet_name),
        FETCH_COLUMNS.0,
        FETCH_COLUMNS.1
    )
}
