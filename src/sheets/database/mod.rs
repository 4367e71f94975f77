// src/sheets/database/mod.rs

pub mod connection;
pub mod error;
pub mod reader;
pub mod row_cache;
pub mod schema;
pub mod writer;

pub use connection::DbConnection;
pub use error::{DbError, DbResult};
pub use reader::{DbReader, StatusCounts};
pub use row_cache::RowCacheStore;
pub use writer::DbWriter;

use std::path::PathBuf;

const DB_FILE_NAME: &str = "sheetsync.db";

/// Database storage configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl DbConfig {
    pub fn default_path() -> PathBuf {
        directories_next::ProjectDirs::from("com", "SheetSync", "sheetsync")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DB_FILE_NAME)
    }

    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(&self) -> DbResult<rusqlite::Connection> {
        DbConnection::open(&self.path)
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new()
    }
}
