// src/sheets/systems/append.rs
// Push a new row to the end of a tab, optionally stamping it with a fresh identifier

use crate::sheets::definitions::SpreadsheetSource;
use crate::sheets::identifier;
use crate::sheets::source::{SourceResult, SpreadsheetDataSource};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendedRow {
    pub sheet: String,
    /// Identifier placed in column A, when one was generated.
    pub identifier: Option<String>,
    pub cells: Vec<String>,
}

/// Append `values` to `sheet_name`. With `assign_identifier` a new identifier is
/// prepended so the row is picked up by the next sync without a backfill.
pub fn append_row(
    data_source: &dyn SpreadsheetDataSource,
    spreadsheet: &SpreadsheetSource,
    sheet_name: &str,
    values: &[String],
    assign_identifier: bool,
) -> SourceResult<AppendedRow> {
    let identifier = assign_identifier.then(identifier::generate);
    let cells: Vec<String> = identifier
        .iter()
        .cloned()
        .chain(values.iter().cloned())
        .collect();

    data_source.append_row(&spreadsheet.external_id, sheet_name, &cells)?;
    info!(
        "Appended a row of {} cells to '{}' in '{}'",
        cells.len(),
        sheet_name,
        spreadsheet.name
    );

    Ok(AppendedRow {
        sheet: sheet_name.to_string(),
        identifier,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::database::{DbConnection, DbReader, DbWriter};
    use crate::sheets::source::MemorySource;
    use crate::sheets::systems::ReconciliationEngine;

    fn values(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn appended_row_with_identifier_is_synced() {
        let mut conn = DbConnection::open_in_memory().unwrap();
        let spreadsheet = DbWriter::register_source(&conn, "Sales", "ext-sales").unwrap();
        let src = MemorySource::new();
        src.set_rows("ext-sales", "Orders", &[&["UUID", "Item"], &["o1", "pen"]]);

        let appended =
            append_row(&src, &spreadsheet, "Orders", &values(&["cup"]), true).unwrap();
        let id = appended.identifier.clone().unwrap();
        assert!(identifier::is_valid(&id));
        assert_eq!(appended.cells, vec![id.clone(), "cup".to_string()]);

        let outcome = ReconciliationEngine::new(&src)
            .reconcile(&mut conn, &spreadsheet, "Orders")
            .unwrap();
        assert_eq!(outcome.synced, 2);
        let cached = DbReader::find_by_identifier(&conn, &id).unwrap().unwrap();
        assert_eq!(cached.row_number, 3);
        assert_eq!(cached.content, appended.cells);
    }

    #[test]
    fn plain_append_keeps_cells_as_given() {
        let conn = DbConnection::open_in_memory().unwrap();
        let spreadsheet = DbWriter::register_source(&conn, "Sales", "ext-sales").unwrap();
        let src = MemorySource::new();
        src.set_rows("ext-sales", "Orders", &[&["UUID", "Item"]]);

        let appended =
            append_row(&src, &spreadsheet, "Orders", &values(&["", "mug"]), false).unwrap();
        assert!(appended.identifier.is_none());
        assert_eq!(src.grid("ext-sales", "Orders").unwrap()[1], vec!["", "mug"]);
    }

    #[test]
    fn append_to_unknown_tab_fails() {
        let conn = DbConnection::open_in_memory().unwrap();
        let spreadsheet = DbWriter::register_source(&conn, "Sales", "ext-sales").unwrap();
        let src = MemorySource::new();
        assert!(append_row(&src, &spreadsheet, "Nope", &values(&["x"]), true).is_err());
    }
}
