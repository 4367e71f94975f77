// src/sheets/systems/discovery.rs
// Register the tabs of a spreadsheet, tagging each with a purpose derived from its name

use crate::sheets::database::DbWriter;
use crate::sheets::definitions::{SheetRef, SpreadsheetSource};
use crate::sheets::errors::SyncError;
use crate::sheets::purpose::classify;
use crate::sheets::source::SpreadsheetDataSource;

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

/// List the tabs at the backend and upsert one `SheetRef` per tab.
/// Tabs that vanished from the backend keep their records.
pub fn discover_sheets(
    conn: &mut Connection,
    data_source: &dyn SpreadsheetDataSource,
    spreadsheet: &SpreadsheetSource,
) -> Result<Vec<SheetRef>, SyncError> {
    let names = data_source.list_sheets(&spreadsheet.external_id)?;
    let now = Utc::now();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut sheets = Vec::with_capacity(names.len());
    for name in &names {
        sheets.push(DbWriter::upsert_sheet(&tx, spreadsheet.id, name, classify(name), now)?);
    }
    tx.commit()?;

    info!("Discovered {} sheets in '{}'", sheets.len(), spreadsheet.name);
    Ok(sheets)
}
