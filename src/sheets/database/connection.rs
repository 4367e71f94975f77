// src/sheets/database/connection.rs

use super::error::DbResult;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DbConnection;

impl DbConnection {
    /// Opens (or creates) the cache database with WAL journaling and the schema in place.
    pub fn open(path: &Path) -> DbResult<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        // Other workers may hold the file while this one switches journal mode
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // PRAGMA settings are per connection, so this runs on every open
        let journal_mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            warn!(
                "Failed to set WAL mode on database {:?}. Current mode: {}",
                path.file_name(),
                journal_mode
            );
        } else {
            debug!("WAL mode activated for database {:?}", path.file_name());
        }

        Self::configure(&conn)?;
        super::schema::ensure_schema(&conn)?;
        Ok(conn)
    }

    /// In-memory database with the full schema, used by tests and dry runs.
    pub fn open_in_memory() -> DbResult<Connection> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        super::schema::ensure_schema(&conn)?;
        Ok(conn)
    }

    fn configure(conn: &Connection) -> DbResult<()> {
        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }
}
