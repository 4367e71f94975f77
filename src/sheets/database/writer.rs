// src/sheets/database/writer.rs

use super::error::{DbError, DbResult};
use crate::sheets::definitions::{SheetRef, SpreadsheetSource};
use crate::sheets::purpose::PurposeTag;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

pub struct DbWriter;

impl DbWriter {
    /// Register a spreadsheet. The external id must not already be registered.
    pub fn register_source(
        conn: &Connection,
        name: &str,
        external_id: &str,
    ) -> DbResult<SpreadsheetSource> {
        let inserted = conn.execute(
            "INSERT INTO spreadsheet_sources (name, external_id, is_active) VALUES (?, ?, 1)",
            params![name, external_id],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(DbError::DuplicateSource(external_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(SpreadsheetSource {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            external_id: external_id.to_string(),
            active: true,
        })
    }

    pub fn set_source_active(conn: &Connection, source_id: i64, active: bool) -> DbResult<()> {
        let changed = conn.execute(
            "UPDATE spreadsheet_sources SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![active, source_id],
        )?;
        if changed == 0 {
            return Err(DbError::SourceNotFound(source_id));
        }
        Ok(())
    }

    /// Remove a source together with its sheets and cached rows.
    pub fn delete_source(conn: &Connection, source_id: i64) -> DbResult<()> {
        let changed = conn.execute("DELETE FROM spreadsheet_sources WHERE id = ?", [source_id])?;
        if changed == 0 {
            return Err(DbError::SourceNotFound(source_id));
        }
        Ok(())
    }

    /// Insert or refresh a sheet by (source, name). Sheets are never removed here.
    pub fn upsert_sheet(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        purpose: PurposeTag,
        synced_at: DateTime<Utc>,
    ) -> DbResult<SheetRef> {
        conn.execute(
            "INSERT INTO sheet_refs (source_id, sheet_name, purpose, last_synced_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(source_id, sheet_name) DO UPDATE SET
                purpose = excluded.purpose,
                last_synced_at = excluded.last_synced_at,
                updated_at = CURRENT_TIMESTAMP",
            params![source_id, sheet_name, purpose.as_str(), synced_at],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM sheet_refs WHERE source_id = ? AND sheet_name = ?",
            params![source_id, sheet_name],
            |r| r.get(0),
        )?;

        Ok(SheetRef {
            id,
            source_id,
            name: sheet_name.to_string(),
            purpose,
            last_synced_at: Some(synced_at),
        })
    }

    pub fn touch_sheet_synced(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        synced_at: DateTime<Utc>,
    ) -> DbResult<()> {
        conn.execute(
            "UPDATE sheet_refs SET last_synced_at = ?, updated_at = CURRENT_TIMESTAMP
             WHERE source_id = ? AND sheet_name = ?",
            params![synced_at, source_id, sheet_name],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::database::{DbConnection, DbReader, RowCacheStore};

    #[test]
    fn register_rejects_duplicate_external_id() {
        let conn = DbConnection::open_in_memory().unwrap();
        DbWriter::register_source(&conn, "Sales", "ext-1").unwrap();
        match DbWriter::register_source(&conn, "Sales copy", "ext-1") {
            Err(DbError::DuplicateSource(ext)) => assert_eq!(ext, "ext-1"),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn upsert_sheet_updates_in_place() {
        let conn = DbConnection::open_in_memory().unwrap();
        let source = DbWriter::register_source(&conn, "Sales", "ext-1").unwrap();

        let first =
            DbWriter::upsert_sheet(&conn, source.id, "Orders", PurposeTag::Data, Utc::now()).unwrap();
        let second =
            DbWriter::upsert_sheet(&conn, source.id, "Orders", PurposeTag::Input, Utc::now())
                .unwrap();
        assert_eq!(first.id, second.id);

        let sheets = DbReader::sheets_for_source(&conn, source.id).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].purpose, PurposeTag::Input);
    }

    #[test]
    fn delete_source_cascades() {
        let conn = DbConnection::open_in_memory().unwrap();
        let source = DbWriter::register_source(&conn, "Sales", "ext-1").unwrap();
        DbWriter::upsert_sheet(&conn, source.id, "Orders", PurposeTag::Data, Utc::now()).unwrap();
        RowCacheStore::find_or_create(&conn, source.id, "Orders", "u1").unwrap();

        DbWriter::delete_source(&conn, source.id).unwrap();

        let sheets: i64 = conn
            .query_row("SELECT COUNT(*) FROM sheet_refs", [], |r| r.get(0))
            .unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM cached_rows", [], |r| r.get(0))
            .unwrap();
        assert_eq!((sheets, rows), (0, 0));

        assert!(matches!(
            DbWriter::delete_source(&conn, source.id),
            Err(DbError::SourceNotFound(_))
        ));
    }

    #[test]
    fn set_source_active_unknown_id() {
        let conn = DbConnection::open_in_memory().unwrap();
        assert!(matches!(
            DbWriter::set_source_active(&conn, 42, false),
            Err(DbError::SourceNotFound(42))
        ));
    }
}
