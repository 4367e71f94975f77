// src/sheets/definitions.rs
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::purpose::PurposeTag;

/// One registered external spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetSource {
    pub id: i64,
    pub name: String,
    /// Opaque identifier of the spreadsheet at the backend.
    pub external_id: String,
    pub active: bool,
}

/// A named tab inside a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRef {
    pub id: i64,
    pub source_id: i64,
    pub name: String,
    pub purpose: PurposeTag,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    #[default]
    Active,
    Deleted,
    Error,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Active => "active",
            RowStatus::Deleted => "deleted",
            RowStatus::Error => "error",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RowStatus::Active),
            "deleted" => Ok(RowStatus::Deleted),
            "error" => Ok(RowStatus::Error),
            other => Err(format!("unknown row status '{}'", other)),
        }
    }
}

impl ToSql for RowStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RowStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Cached copy of one logical sheet row, keyed by its identifier rather than its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRow {
    pub id: i64,
    pub identifier: String,
    pub source_id: i64,
    pub sheet_name: String,
    /// Sheet row number at the last sync (header is row 1).
    pub row_number: i64,
    pub content: Vec<String>,
    pub status: RowStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Set when the record was inserted by the current lookup.
    #[serde(skip)]
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn json_reports_carry_rfc3339_sync_times() {
        let synced = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let row = CachedRow {
            id: 7,
            identifier: "u1".into(),
            source_id: 1,
            sheet_name: "Orders".into(),
            row_number: 2,
            content: vec!["u1".into(), "pen".into()],
            status: RowStatus::Deleted,
            last_synced_at: Some(synced),
            created: true,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["last_synced_at"], "2025-03-01T09:30:00Z");
        assert_eq!(json["status"], "deleted");
        assert!(json.get("created").is_none());

        let back: CachedRow = serde_json::from_value(json).unwrap();
        assert_eq!(back.last_synced_at, Some(synced));
        assert!(!back.created);

        let sheet: SheetRef = serde_json::from_str(
            r#"{"id":1,"source_id":1,"name":"Main","purpose":"data","last_synced_at":null}"#,
        )
        .unwrap();
        assert!(sheet.last_synced_at.is_none());
    }
}
