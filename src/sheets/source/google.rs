// src/sheets/source/google.rs
// Google Sheets v4 + Drive v3 backed data source

use super::credentials::CredentialProvider;
use super::{CellWrite, SourceError, SourceResult, SpreadsheetDataSource};
use crate::sheets::range::{a1_cell, full_sheet_range};

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    modified_time: String,
}

pub struct GoogleSheetsSource {
    http: Client,
    credentials: Arc<dyn CredentialProvider>,
    sheets_base: String,
    drive_base: String,
}

impl GoogleSheetsSource {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> SourceResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http, credentials))
    }

    pub fn with_client(http: Client, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http,
            credentials,
            sheets_base: SHEETS_API_BASE.to_string(),
            drive_base: DRIVE_API_BASE.to_string(),
        }
    }

    pub fn with_base_urls(mut self, sheets_base: &str, drive_base: &str) -> Self {
        self.sheets_base = sheets_base.trim_end_matches('/').to_string();
        self.drive_base = drive_base.trim_end_matches('/').to_string();
        self
    }

    fn url(base: &str, segments: &[&str]) -> SourceResult<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| SourceError::Other(format!("invalid API base '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Other(format!("API base '{}' cannot take a path", base)))?
            .extend(segments);
        Ok(url)
    }

    fn spreadsheet_url(&self, external_id: &str) -> SourceResult<Url> {
        let mut url = Self::url(&self.sheets_base, &["spreadsheets", external_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        Ok(url)
    }

    fn values_url(&self, external_id: &str, range: &str) -> SourceResult<Url> {
        Self::url(&self.sheets_base, &["spreadsheets", external_id, "values", range])
    }

    fn append_url(&self, external_id: &str, range: &str) -> SourceResult<Url> {
        let target = format!("{}:append", range);
        let mut url = Self::url(
            &self.sheets_base,
            &["spreadsheets", external_id, "values", &target],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        Ok(url)
    }

    fn batch_update_url(&self, external_id: &str) -> SourceResult<Url> {
        Self::url(
            &self.sheets_base,
            &["spreadsheets", external_id, "values:batchUpdate"],
        )
    }

    fn drive_file_url(&self, external_id: &str) -> SourceResult<Url> {
        let mut url = Self::url(&self.drive_base, &["files", external_id])?;
        url.query_pairs_mut().append_pair("fields", "modifiedTime");
        Ok(url)
    }

    /// Send with the current token; on 401 refresh once and resend.
    fn send<F>(&self, operation: &str, build: F) -> SourceResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.credentials.access_token()?;
        let mut response = build(&self.http).bearer_auth(&token).send()?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("{} was rejected with 401, refreshing credentials", operation);
            let token = self.credentials.refresh()?;
            response = build(&self.http).bearer_auth(&token).send()?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(format!("{}: {}", operation, body)));
        }
        Err(SourceError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Render a cell value the way it appears in the sheet.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn batch_update_body(sheet_name: &str, cells: &[CellWrite]) -> Value {
    let data: Vec<Value> = cells
        .iter()
        .map(|cell| {
            json!({
                "range": a1_cell(sheet_name, &cell.address),
                "values": [[cell.value]],
            })
        })
        .collect();
    json!({
        "valueInputOption": "USER_ENTERED",
        "data": data,
    })
}

fn append_body(values: &[String]) -> Value {
    json!({
        "majorDimension": "ROWS",
        "values": [values],
    })
}

impl SpreadsheetDataSource for GoogleSheetsSource {
    fn list_sheets(&self, external_id: &str) -> SourceResult<Vec<String>> {
        let url = self.spreadsheet_url(external_id)?;
        let meta: SpreadsheetMeta = self
            .send("spreadsheets.get", |http| http.get(url.clone()))?
            .json()?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    fn fetch_grid(&self, external_id: &str, sheet_name: &str) -> SourceResult<Vec<Vec<String>>> {
        let range = full_sheet_range(sheet_name);
        let url = self.values_url(external_id, &range)?;
        debug!("Fetching {} from {}", range, external_id);
        let values: ValueRange = self
            .send("values.get", |http| http.get(url.clone()))?
            .json()?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    fn write_cells(
        &self,
        external_id: &str,
        sheet_name: &str,
        cells: &[CellWrite],
    ) -> SourceResult<()> {
        if cells.is_empty() {
            return Ok(());
        }
        let url = self.batch_update_url(external_id)?;
        let body = batch_update_body(sheet_name, cells);
        self.send("values.batchUpdate", |http| http.post(url.clone()).json(&body))?;
        Ok(())
    }

    fn append_row(
        &self,
        external_id: &str,
        sheet_name: &str,
        values: &[String],
    ) -> SourceResult<()> {
        let range = full_sheet_range(sheet_name);
        let url = self.append_url(external_id, &range)?;
        let body = append_body(values);
        debug!("Appending {} cells to {} in {}", values.len(), range, external_id);
        self.send("values.append", |http| http.post(url.clone()).json(&body))?;
        Ok(())
    }

    fn last_modified_time(&self, external_id: &str) -> SourceResult<DateTime<Utc>> {
        let url = self.drive_file_url(external_id)?;
        let file: DriveFile = self
            .send("files.get", |http| http.get(url.clone()))?
            .json()?;
        DateTime::parse_from_rfc3339(&file.modified_time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                SourceError::Decode(format!(
                    "modifiedTime '{}' is not RFC 3339: {}",
                    file.modified_time, e
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::range::CellAddress;
    use crate::sheets::source::StaticToken;

    fn source() -> GoogleSheetsSource {
        GoogleSheetsSource::with_client(Client::new(), Arc::new(StaticToken::new("t")))
    }

    #[test]
    fn values_url_encodes_quoted_ranges() {
        let url = source()
            .values_url("abc123", &full_sheet_range("Input Data"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'Input%20Data'!A:Z"
        );
    }

    #[test]
    fn metadata_urls() {
        let s = source();
        assert_eq!(
            s.spreadsheet_url("abc").unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc?fields=sheets.properties.title"
        );
        assert_eq!(
            s.drive_file_url("abc").unwrap().as_str(),
            "https://www.googleapis.com/drive/v3/files/abc?fields=modifiedTime"
        );
        assert_eq!(
            s.batch_update_url("abc").unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values:batchUpdate"
        );
    }

    #[test]
    fn batch_body_addresses_identifier_cells() {
        let cells = vec![
            CellWrite::new(CellAddress::identifier_cell(3), "id-3"),
            CellWrite::new(CellAddress::identifier_cell(9), "id-9"),
        ];
        let body = batch_update_body("My Sheet", &cells);
        assert_eq!(body["valueInputOption"], "USER_ENTERED");
        assert_eq!(body["data"][0]["range"], "'My Sheet'!A3");
        assert_eq!(body["data"][1]["values"][0][0], "id-9");
    }

    #[test]
    fn append_targets_the_quoted_sheet_range() {
        let s = source();
        assert_eq!(
            s.append_url("abc", &full_sheet_range("Test Sheet")).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'Test%20Sheet'!A:Z:append?valueInputOption=USER_ENTERED"
        );
        assert_eq!(
            s.append_url("abc", &full_sheet_range("SimpleSheet")).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/SimpleSheet!A:Z:append?valueInputOption=USER_ENTERED"
        );

        let body = append_body(&["New Value 1".to_string(), "New Value 2".to_string()]);
        assert_eq!(body["values"], json!([["New Value 1", "New Value 2"]]));
    }

    #[test]
    fn cell_text_renders_non_strings() {
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(12)), "12");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[test]
    fn value_range_without_values_is_empty() {
        let parsed: ValueRange = serde_json::from_str(r#"{"range":"Sheet1!A1:Z1000"}"#).unwrap();
        assert!(parsed.values.is_empty());
    }
}
