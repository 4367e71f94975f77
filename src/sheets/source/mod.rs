// src/sheets/source/mod.rs
// External spreadsheet backend: the capability the sync engines talk to

pub mod credentials;
pub mod google;
pub mod memory;

pub use credentials::{CredentialProvider, OAuthRefreshCredentials, StaticToken};
pub use google::GoogleSheetsSource;
pub use memory::MemorySource;

use crate::sheets::range::CellAddress;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Credential store error: {0}")]
    Credential(#[from] keyring::Error),
    #[error("Spreadsheet not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One value destined for one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub address: CellAddress,
    pub value: String,
}

impl CellWrite {
    pub fn new(address: CellAddress, value: impl Into<String>) -> Self {
        Self {
            address,
            value: value.into(),
        }
    }
}

/// Operations the engines need from the spreadsheet backend.
///
/// Implementations own their timeout and retry policy; the engines never retry.
pub trait SpreadsheetDataSource: Send + Sync {
    /// Tab titles of the spreadsheet, in display order.
    fn list_sheets(&self, external_id: &str) -> SourceResult<Vec<String>>;

    /// Every populated row of the tab, header first. Rows may be ragged.
    fn fetch_grid(&self, external_id: &str, sheet_name: &str) -> SourceResult<Vec<Vec<String>>>;

    /// Write all cells in a single request.
    fn write_cells(
        &self,
        external_id: &str,
        sheet_name: &str,
        cells: &[CellWrite],
    ) -> SourceResult<()>;

    /// Add one row after the last populated row of the tab.
    fn append_row(
        &self,
        external_id: &str,
        sheet_name: &str,
        values: &[String],
    ) -> SourceResult<()>;

    /// When the spreadsheet content was last changed by anyone.
    fn last_modified_time(&self, external_id: &str) -> SourceResult<DateTime<Utc>>;
}
