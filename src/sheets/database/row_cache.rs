// src/sheets/database/row_cache.rs
// Identifier-keyed row cache: lookup, upsert and soft deletion

use super::error::DbResult;
use crate::sheets::definitions::{CachedRow, RowStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;

pub struct RowCacheStore;

const ROW_COLUMNS: &str =
    "id, identifier, source_id, sheet_name, row_number, content, status, last_synced_at";

pub(crate) fn map_cached_row(row: &Row<'_>) -> rusqlite::Result<CachedRow> {
    let content_json: String = row.get(5)?;
    let content: Vec<String> = serde_json::from_str(&content_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(CachedRow {
        id: row.get(0)?,
        identifier: row.get(1)?,
        source_id: row.get(2)?,
        sheet_name: row.get(3)?,
        row_number: row.get(4)?,
        content,
        status: row.get(6)?,
        last_synced_at: row.get(7)?,
        created: false,
    })
}

impl RowCacheStore {
    /// Look up the row for `identifier` within (source, sheet), inserting an empty
    /// active record when there is none. Calling it twice returns the same record.
    ///
    /// Identifiers are unique across the whole store, so an identifier already owned
    /// by another sheet makes the insert fail with a constraint error.
    pub fn find_or_create(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        identifier: &str,
    ) -> DbResult<CachedRow> {
        if let Some(existing) = Self::find(conn, source_id, sheet_name, identifier)? {
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO cached_rows (identifier, source_id, sheet_name, row_number, content, status)
             VALUES (?, ?, ?, 0, '[]', ?)",
            params![identifier, source_id, sheet_name, RowStatus::Active],
        )?;

        Ok(CachedRow {
            id: conn.last_insert_rowid(),
            identifier: identifier.to_string(),
            source_id,
            sheet_name: sheet_name.to_string(),
            row_number: 0,
            content: Vec::new(),
            status: RowStatus::Active,
            last_synced_at: None,
            created: true,
        })
    }

    pub fn find(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        identifier: &str,
    ) -> DbResult<Option<CachedRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cached_rows
                     WHERE source_id = ? AND sheet_name = ? AND identifier = ?",
                    ROW_COLUMNS
                ),
                params![source_id, sheet_name, identifier],
                map_cached_row,
            )
            .optional()?;
        Ok(row)
    }

    /// True for a freshly created record or when the stored cells differ from `new_content`.
    pub fn should_update(existing: &CachedRow, new_content: &[String]) -> bool {
        existing.created || existing.content.as_slice() != new_content
    }

    /// Store the fetched cells and position, reset the status to active and stamp the sync time.
    pub fn update_from_fetch(
        conn: &Connection,
        row: &mut CachedRow,
        content: &[String],
        row_number: i64,
        synced_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let content_json = serde_json::to_string(content)?;
        conn.execute(
            "UPDATE cached_rows
             SET content = ?, row_number = ?, status = ?, last_synced_at = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![content_json, row_number, RowStatus::Active, synced_at, row.id],
        )?;

        row.content = content.to_vec();
        row.row_number = row_number;
        row.status = RowStatus::Active;
        row.last_synced_at = Some(synced_at);
        Ok(())
    }

    /// Flip every active row of (source, sheet) whose identifier was not seen to `deleted`.
    /// Returns the number of rows transitioned.
    pub fn mark_missing_as_deleted(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        seen_identifiers: &HashSet<String>,
    ) -> DbResult<usize> {
        // The seen set travels as one JSON array parameter
        let seen_json = serde_json::to_string(seen_identifiers)?;
        let changed = conn.execute(
            "UPDATE cached_rows SET status = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE source_id = ?2 AND sheet_name = ?3 AND status = ?4
               AND identifier NOT IN (SELECT value FROM json_each(?5))",
            params![
                RowStatus::Deleted,
                source_id,
                sheet_name,
                RowStatus::Active,
                seen_json
            ],
        )?;
        Ok(changed)
    }

    /// Put a row of (source, sheet) into the error state regardless of its current status.
    pub fn mark_error(
        conn: &Connection,
        source_id: i64,
        sheet_name: &str,
        identifier: &str,
    ) -> DbResult<bool> {
        let changed = conn.execute(
            "UPDATE cached_rows SET status = ?, updated_at = CURRENT_TIMESTAMP
             WHERE source_id = ? AND sheet_name = ? AND identifier = ?",
            params![RowStatus::Error, source_id, sheet_name, identifier],
        )?;
        Ok(changed > 0)
    }
}
