// src/sheets/systems/jobs.rs
//! Job entry points: run reconciliation or backfill over one source or every active one.
//!
//! Failures are contained per unit of work. A sheet that fails validation or transport
//! is reported and logged, then the job moves on to the next sheet and source.
//! The async runners fan sources out over `spawn_blocking`, one connection per task,
//! so a given sheet is never reconciled twice at the same time within one run.

use crate::sheets::database::{DbConfig, DbError, DbReader, DbResult};
use crate::sheets::definitions::SpreadsheetSource;
use crate::sheets::errors::SyncError;
use crate::sheets::source::SpreadsheetDataSource;
use crate::sheets::systems::backfill::{BackfillConfig, BackfillEngine, BackfillReport, Throttle};
use crate::sheets::systems::reconcile::{ReconciliationEngine, SyncOutcome};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SheetSyncResult {
    Synced(SyncOutcome),
    /// The sheet failed validation; the message names the sheet and the offending header.
    Invalid { message: String },
    /// Transport or storage failure; the pass for this sheet was rolled back.
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSyncReport {
    pub source: String,
    pub sheet: String,
    #[serde(flatten)]
    pub result: SheetSyncResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncJobReport {
    pub sheets: Vec<SheetSyncReport>,
    pub failed_sources: Vec<SourceFailure>,
}

impl SyncJobReport {
    pub fn has_failures(&self) -> bool {
        !self.failed_sources.is_empty()
            || self.sheets.iter().any(|s| match &s.result {
                SheetSyncResult::Synced(outcome) => !outcome.errors.is_empty(),
                _ => true,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceBackfillReport {
    pub source: String,
    pub report: BackfillReport,
    /// Set when the freshness guard deferred this source.
    pub retry_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillJobReport {
    pub sources: Vec<SourceBackfillReport>,
    pub failed_sources: Vec<SourceFailure>,
}

fn log_sync_result(spreadsheet: &SpreadsheetSource, sheet_name: &str, result: &SheetSyncResult) {
    match result {
        SheetSyncResult::Synced(outcome) => {
            info!(
                "Synced {}/{}: {} updated, {} skipped, {} deleted",
                spreadsheet.name, sheet_name, outcome.synced, outcome.skipped, outcome.deleted
            );
            if !outcome.errors.is_empty() {
                let encoded = serde_json::to_string(&outcome.errors)
                    .unwrap_or_else(|e| format!("<unencodable errors: {}>", e));
                error!(
                    "Sync errors for {}/{}: {}",
                    spreadsheet.name, sheet_name, encoded
                );
            }
        }
        SheetSyncResult::Invalid { message } => {
            error!("Validation failed for {}/{}: {}", spreadsheet.name, sheet_name, message);
        }
        SheetSyncResult::Failed { message } => {
            error!("Sync of {}/{} failed: {}", spreadsheet.name, sheet_name, message);
        }
    }
}

/// Reconcile every known sheet of one source.
pub fn sync_source(
    conn: &mut Connection,
    data_source: &dyn SpreadsheetDataSource,
    spreadsheet: &SpreadsheetSource,
) -> DbResult<Vec<SheetSyncReport>> {
    let sheets = DbReader::sheets_for_source(conn, spreadsheet.id)?;
    if sheets.is_empty() {
        warn!(
            "Source '{}' has no discovered sheets; run discovery first",
            spreadsheet.name
        );
    }

    let engine = ReconciliationEngine::new(data_source);
    let mut reports = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let result = match engine.reconcile(conn, spreadsheet, &sheet.name) {
            Ok(outcome) => SheetSyncResult::Synced(outcome),
            Err(SyncError::Invalid(e)) => SheetSyncResult::Invalid {
                message: e.to_string(),
            },
            Err(e) => SheetSyncResult::Failed {
                message: e.to_string(),
            },
        };
        log_sync_result(spreadsheet, &sheet.name, &result);
        reports.push(SheetSyncReport {
            source: spreadsheet.name.clone(),
            sheet: sheet.name,
            result,
        });
    }
    Ok(reports)
}

/// Sequential sync of one source (regardless of its active flag) or of all active sources.
pub fn run_sync_job(
    conn: &mut Connection,
    data_source: &dyn SpreadsheetDataSource,
    source_id: Option<i64>,
) -> DbResult<SyncJobReport> {
    let mut report = SyncJobReport::default();
    for spreadsheet in DbReader::sources_for_sync(conn, source_id)? {
        match sync_source(conn, data_source, &spreadsheet) {
            Ok(sheets) => report.sheets.extend(sheets),
            Err(e) => {
                error!("Sync of source '{}' failed: {}", spreadsheet.name, e);
                report.failed_sources.push(SourceFailure {
                    source: spreadsheet.name,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// Backfill every known sheet of one source.
pub fn backfill_source(
    conn: &Connection,
    data_source: &dyn SpreadsheetDataSource,
    throttle: &dyn Throttle,
    config: BackfillConfig,
    retry_after: chrono::Duration,
    spreadsheet: &SpreadsheetSource,
) -> DbResult<SourceBackfillReport> {
    let sheet_names: Vec<String> = DbReader::sheets_for_source(conn, spreadsheet.id)?
        .into_iter()
        .map(|s| s.name)
        .collect();

    let report = BackfillEngine::new(data_source, config, throttle).backfill(spreadsheet, &sheet_names);
    let retry_after = report.skipped_recent_activity.then(|| Utc::now() + retry_after);
    if let Some(at) = retry_after {
        info!("Backfill for '{}' deferred until {}", spreadsheet.name, at);
    }

    Ok(SourceBackfillReport {
        source: spreadsheet.name.clone(),
        report,
        retry_after,
    })
}

pub fn run_backfill_job(
    conn: &Connection,
    data_source: &dyn SpreadsheetDataSource,
    throttle: &dyn Throttle,
    config: BackfillConfig,
    retry_after: chrono::Duration,
    source_id: Option<i64>,
) -> DbResult<BackfillJobReport> {
    let mut job = BackfillJobReport::default();
    for spreadsheet in DbReader::sources_for_sync(conn, source_id)? {
        match backfill_source(conn, data_source, throttle, config, retry_after, &spreadsheet) {
            Ok(report) => job.sources.push(report),
            Err(e) => {
                error!("Backfill of source '{}' failed: {}", spreadsheet.name, e);
                job.failed_sources.push(SourceFailure {
                    source: spreadsheet.name,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(job)
}

async fn load_sources(db: &DbConfig, source_id: Option<i64>) -> DbResult<Vec<SpreadsheetSource>> {
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        DbReader::sources_for_sync(&conn, source_id)
    })
    .await
    .map_err(|e| DbError::Other(format!("Tokio panic: {}", e)))?
}

/// Run `work` for each source on the blocking pool, each task with its own connection.
/// Results come back in source order.
async fn for_each_source<T, F>(
    db: &DbConfig,
    sources: Vec<SpreadsheetSource>,
    work: F,
) -> Vec<(SpreadsheetSource, Result<T, String>)>
where
    T: Send + 'static,
    F: Fn(&mut Connection, &SpreadsheetSource) -> DbResult<T> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let handles: Vec<_> = sources
        .into_iter()
        .map(|spreadsheet| {
            let db = db.clone();
            let work = Arc::clone(&work);
            let task = tokio::task::spawn_blocking({
                let spreadsheet = spreadsheet.clone();
                move || {
                    let mut conn = db.open()?;
                    work(&mut conn, &spreadsheet)
                }
            });
            (spreadsheet, task)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (spreadsheet, task) in handles {
        let result = match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("Tokio panic: {}", e)),
        };
        results.push((spreadsheet, result));
    }
    results
}

/// Concurrent variant of [`run_sync_job`]: sources run in parallel, sheets of one source in order.
pub async fn run_sync_job_concurrent(
    db: DbConfig,
    data_source: Arc<dyn SpreadsheetDataSource>,
    source_id: Option<i64>,
) -> DbResult<SyncJobReport> {
    let sources = load_sources(&db, source_id).await?;

    let results = for_each_source(&db, sources, move |conn, spreadsheet| {
        sync_source(conn, data_source.as_ref(), spreadsheet)
    })
    .await;

    let mut report = SyncJobReport::default();
    for (spreadsheet, result) in results {
        match result {
            Ok(sheets) => report.sheets.extend(sheets),
            Err(error) => {
                error!("Sync of source '{}' failed: {}", spreadsheet.name, error);
                report.failed_sources.push(SourceFailure {
                    source: spreadsheet.name,
                    error,
                });
            }
        }
    }
    Ok(report)
}

/// Concurrent variant of [`run_backfill_job`].
pub async fn run_backfill_job_concurrent(
    db: DbConfig,
    data_source: Arc<dyn SpreadsheetDataSource>,
    throttle: Arc<dyn Throttle>,
    config: BackfillConfig,
    retry_after: chrono::Duration,
    source_id: Option<i64>,
) -> DbResult<BackfillJobReport> {
    let sources = load_sources(&db, source_id).await?;

    let results = for_each_source(&db, sources, move |conn, spreadsheet| {
        backfill_source(
            conn,
            data_source.as_ref(),
            throttle.as_ref(),
            config,
            retry_after,
            spreadsheet,
        )
    })
    .await;

    let mut job = BackfillJobReport::default();
    for (spreadsheet, result) in results {
        match result {
            Ok(report) => job.sources.push(report),
            Err(error) => {
                error!("Backfill of source '{}' failed: {}", spreadsheet.name, error);
                job.failed_sources.push(SourceFailure {
                    source: spreadsheet.name,
                    error,
                });
            }
        }
    }
    Ok(job)
}
