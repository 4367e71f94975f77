// src/sheets/database/schema.rs

use super::error::DbResult;
use rusqlite::Connection;

/// Create every table and index the cache needs. Safe to call on an existing database.
pub fn ensure_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS spreadsheet_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            external_id TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sheet_refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES spreadsheet_sources(id) ON DELETE CASCADE,
            sheet_name TEXT NOT NULL,
            purpose TEXT NOT NULL DEFAULT 'data',
            last_synced_at TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(source_id, sheet_name)
        );

        CREATE TABLE IF NOT EXISTS cached_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL UNIQUE,
            source_id INTEGER NOT NULL REFERENCES spreadsheet_sources(id) ON DELETE CASCADE,
            sheet_name TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            content TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'deleted', 'error')),
            last_synced_at TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_cached_rows_sheet_status
            ON cached_rows(source_id, sheet_name, status);
        CREATE INDEX IF NOT EXISTS idx_cached_rows_position
            ON cached_rows(source_id, sheet_name, row_number);",
    )?;
    Ok(())
}
