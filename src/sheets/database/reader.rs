// src/sheets/database/reader.rs

use super::error::{DbError, DbResult};
use super::row_cache::map_cached_row;
use crate::sheets::definitions::{CachedRow, RowStatus, SheetRef, SpreadsheetSource};
use crate::sheets::purpose::PurposeTag;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

pub struct DbReader;

/// Row counts per status for one sheet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub deleted: usize,
    pub error: usize,
}

fn map_source(row: &Row<'_>) -> rusqlite::Result<SpreadsheetSource> {
    Ok(SpreadsheetSource {
        id: row.get(0)?,
        name: row.get(1)?,
        external_id: row.get(2)?,
        active: row.get(3)?,
    })
}

fn map_sheet(row: &Row<'_>) -> rusqlite::Result<SheetRef> {
    let purpose: String = row.get(3)?;
    Ok(SheetRef {
        id: row.get(0)?,
        source_id: row.get(1)?,
        name: row.get(2)?,
        // Unknown tags fall back to the generic bucket
        purpose: purpose.parse().unwrap_or(PurposeTag::Data),
        last_synced_at: row.get(4)?,
    })
}

impl DbReader {
    pub fn list_sources(conn: &Connection) -> DbResult<Vec<SpreadsheetSource>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, external_id, is_active FROM spreadsheet_sources ORDER BY id",
        )?;
        let sources = stmt
            .query_map([], map_source)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn get_source(conn: &Connection, source_id: i64) -> DbResult<SpreadsheetSource> {
        conn.query_row(
            "SELECT id, name, external_id, is_active FROM spreadsheet_sources WHERE id = ?",
            [source_id],
            map_source,
        )
        .optional()?
        .ok_or(DbError::SourceNotFound(source_id))
    }

    /// A specific source (whatever its active flag) or every active source.
    pub fn sources_for_sync(
        conn: &Connection,
        source_id: Option<i64>,
    ) -> DbResult<Vec<SpreadsheetSource>> {
        match source_id {
            Some(id) => Ok(vec![Self::get_source(conn, id)?]),
            None => Ok(Self::list_sources(conn)?
                .into_iter()
                .filter(|s| s.active)
                .collect()),
        }
    }

    pub fn sheets_for_source(conn: &Connection, source_id: i64) -> DbResult<Vec<SheetRef>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_id, sheet_name, purpose, last_synced_at
             FROM sheet_refs WHERE source_id = ? ORDER BY id",
        )?;
        let sheets = stmt
            .query_map([source_id], map_sheet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sheets)
    }

    /// Cached rows of a sheet ordered by position, optionally narrowed to one status.
    pub fn rows_for_sheet(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        status: Option<RowStatus>,
    ) -> DbResult<Vec<CachedRow>> {
        let base = "SELECT id, identifier, source_id, sheet_name, row_number, content, status, last_synced_at
                    FROM cached_rows WHERE source_id = ? AND sheet_name = ?";
        let rows = match status {
            Some(status) => {
                let mut stmt =
                    conn.prepare(&format!("{} AND status = ? ORDER BY row_number, id", base))?;
                let rows = stmt
                    .query_map(params![source_id, sheet_name, status], map_cached_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY row_number, id", base))?;
                let rows = stmt
                    .query_map(params![source_id, sheet_name], map_cached_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn find_by_identifier(conn: &Connection, identifier: &str) -> DbResult<Option<CachedRow>> {
        let row = conn
            .query_row(
                "SELECT id, identifier, source_id, sheet_name, row_number, content, status, last_synced_at
                 FROM cached_rows WHERE identifier = ?",
                [identifier],
                map_cached_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn count_by_status(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
    ) -> DbResult<StatusCounts> {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM cached_rows
             WHERE source_id = ? AND sheet_name = ? GROUP BY status",
        )?;
        let mut counts = StatusCounts::default();
        let rows = stmt.query_map(params![source_id, sheet_name], |r| {
            Ok((r.get::<_, RowStatus>(0)?, r.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, n) = row?;
            let n = n as usize;
            match status {
                RowStatus::Active => counts.active = n,
                RowStatus::Deleted => counts.deleted = n,
                RowStatus::Error => counts.error = n,
            }
        }
        Ok(counts)
    }
}
