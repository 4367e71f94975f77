// src/sheets/errors.rs

use super::database::DbError;
use super::sheet_grid_data::GridError;
use super::source::SourceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one unit of work (one sheet sync, one discovery pass).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sheet data: {0}")]
    Invalid(#[from] GridError),
    #[error("Spreadsheet backend error: {0}")]
    Source(#[from] SourceError),
    #[error("Cache database error: {0}")]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Db(DbError::from(e))
    }
}

/// A row that could not be applied. The rest of the pass carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: usize,
    pub error: String,
}
