// src/sheets/sheet_grid_data.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal that must sit in the first header cell of every synchronised sheet.
pub const REQUIRED_IDENTIFIER_HEADER: &str = "UUID";

/// Sheet rows occupied by the header. Data position `p` lives on sheet row `p + HEADER_ROWS`.
pub const HEADER_ROWS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("{} - header cell A1 must be '{}' (found: '{found}')", describe(.sheet, .spreadsheet), REQUIRED_IDENTIFIER_HEADER)]
    HeaderMismatch {
        sheet: String,
        spreadsheet: String,
        found: String,
    },
    #[error("{} - header row is missing", describe(.sheet, .spreadsheet))]
    MissingHeader { sheet: String, spreadsheet: String },
}

fn describe(sheet: &str, spreadsheet: &str) -> String {
    match (sheet.is_empty(), spreadsheet.is_empty()) {
        (false, false) => format!("Sheet '{}' in '{}'", sheet, spreadsheet),
        (false, true) => format!("Sheet '{}'", sheet),
        _ => "Invalid sheet data".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingIdentifierRow {
    /// Sheet row number (header is row 1).
    pub row_number: usize,
}

/// One fetch of a sheet: header row plus data rows. Never persisted.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct SheetGridData {
    pub sheet_name: String,
    pub source_name: String,
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

pub fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}

impl SheetGridData {
    /// First row becomes the header, the rest are data. Empty input gives an empty grid.
    pub fn parse(
        raw_rows: Vec<Vec<String>>,
        sheet_name: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        let mut iter = raw_rows.into_iter();
        let header = iter.next();
        Self {
            sheet_name: sheet_name.into(),
            source_name: source_name.into(),
            header,
            rows: iter.collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.rows.is_empty()
    }

    pub fn validate(&self) -> Result<(), GridError> {
        let header = match &self.header {
            Some(header) => header,
            None if self.rows.is_empty() => return Ok(()),
            None => return Err(self.missing_header()),
        };

        let Some(first) = header.first() else {
            return Err(self.missing_header());
        };

        if first != REQUIRED_IDENTIFIER_HEADER {
            return Err(GridError::HeaderMismatch {
                sheet: self.sheet_name.clone(),
                spreadsheet: self.source_name.clone(),
                found: first.clone(),
            });
        }
        Ok(())
    }

    fn missing_header(&self) -> GridError {
        GridError::MissingHeader {
            sheet: self.sheet_name.clone(),
            spreadsheet: self.source_name.clone(),
        }
    }

    pub fn identifier_for_row(row: &[String]) -> Option<&str> {
        row.first().map(String::as_str).filter(|cell| !is_blank(cell))
    }

    /// Data rows with a non-blank identifier, paired with their 1-based data position.
    /// Skipped rows leave gaps in the numbering.
    pub fn rows_with_identifier(&self) -> impl Iterator<Item = (&[String], usize)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| Self::identifier_for_row(row).is_some())
            .map(|(idx, row)| (row.as_slice(), idx + 1))
    }

    /// Rows lacking an identifier that still carry data elsewhere. Fully blank rows are ignored.
    pub fn missing_identifier_rows(&self) -> Vec<MissingIdentifierRow> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                Self::identifier_for_row(row).is_none()
                    && row.iter().skip(1).any(|cell| !is_blank(cell))
            })
            .map(|(idx, _)| MissingIdentifierRow {
                row_number: sheet_row(idx + 1),
            })
            .collect()
    }
}

/// Sheet row number for a 1-based data position.
pub fn sheet_row(position: usize) -> usize {
    position + HEADER_ROWS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(raw: &[&[&str]]) -> SheetGridData {
        let rows = raw
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        SheetGridData::parse(rows, "Orders", "Sales")
    }

    #[test]
    fn empty_input_is_valid_and_empty() {
        let g = SheetGridData::parse(Vec::new(), "Orders", "Sales");
        assert!(g.is_empty());
        assert!(g.validate().is_ok());
        assert_eq!(g.rows_with_identifier().count(), 0);
        assert!(g.missing_identifier_rows().is_empty());
    }

    #[test]
    fn header_must_start_with_uuid() {
        assert!(grid(&[&["UUID", "Name"]]).validate().is_ok());

        let err = grid(&[&["ID", "Name"], &["u1", "Alice"]]).validate().unwrap_err();
        assert_eq!(
            err,
            GridError::HeaderMismatch {
                sheet: "Orders".into(),
                spreadsheet: "Sales".into(),
                found: "ID".into()
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("'ID'"), "{}", msg);
        assert!(msg.contains("Orders") && msg.contains("Sales"), "{}", msg);
    }

    #[test]
    fn header_match_is_exact() {
        assert!(grid(&[&["uuid"]]).validate().is_err());
        assert!(grid(&[&[" UUID"]]).validate().is_err());
    }

    #[test]
    fn empty_header_row_is_missing_header() {
        let g = SheetGridData::parse(vec![vec![]], "Orders", "Sales");
        assert!(matches!(g.validate(), Err(GridError::MissingHeader { .. })));

        let g = SheetGridData {
            sheet_name: "Orders".into(),
            source_name: String::new(),
            header: None,
            rows: vec![vec!["u1".into()]],
        };
        let err = g.validate().unwrap_err();
        assert_eq!(err.to_string(), "Sheet 'Orders' - header row is missing");
    }

    #[test]
    fn rows_with_identifier_keep_original_positions() {
        let g = grid(&[
            &["UUID", "Name"],
            &["u1", "Alice"],
            &["", "Bob"],
            &["u3", "Carol"],
            &["   ", ""],
            &["u5"],
        ]);
        let seen: Vec<(String, usize)> = g
            .rows_with_identifier()
            .map(|(row, pos)| (row[0].clone(), pos))
            .collect();
        assert_eq!(
            seen,
            vec![("u1".into(), 1), ("u3".into(), 3), ("u5".into(), 5)]
        );
    }

    #[test]
    fn missing_identifier_rows_skip_fully_blank_rows() {
        let g = grid(&[
            &["UUID", "Name", "Qty"],
            &["u1", "Alice", "1"],
            &["", "Bob", ""],
            &["", "", ""],
            &[],
            &["  ", "", "7"],
        ]);
        assert_eq!(
            g.missing_identifier_rows(),
            vec![
                MissingIdentifierRow { row_number: 3 },
                MissingIdentifierRow { row_number: 6 }
            ]
        );
    }
}
