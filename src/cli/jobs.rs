// src/cli/jobs.rs
// Commands that talk to Google: discovery, sync, backfill, row appends and token storage

use super::{CliError, CliResult, Context};
use crate::sheets::database::DbReader;
use crate::sheets::source::{
    CredentialProvider, GoogleSheetsSource, OAuthRefreshCredentials, SpreadsheetDataSource,
    StaticToken,
};
use crate::sheets::systems::{
    append_row, discover_sheets, run_backfill_job_concurrent, run_sync_job, run_sync_job_concurrent,
    BackfillJobReport, SheetSyncResult, SyncJobReport, ThreadSleep, Throttle,
};

use std::sync::Arc;
use tracing::{debug, info};

/// Build the Google client. Must run outside the async runtime: the blocking
/// HTTP client spins up its own.
fn google_source(ctx: &Context) -> CliResult<Arc<GoogleSheetsSource>> {
    let google = &ctx.settings.google;
    let credentials: Arc<dyn CredentialProvider> = match &google.access_token {
        Some(token) => {
            debug!("Using static access token from the environment");
            Arc::new(StaticToken::new(token.clone()))
        }
        None => {
            let (Some(client_id), Some(client_secret)) = (&google.client_id, &google.client_secret)
            else {
                return Err(CliError::Usage(
                    "Google credentials missing: set GOOGLE_ACCESS_TOKEN, or GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET with a stored refresh token".to_string(),
                ));
            };
            let http = reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(crate::sheets::source::SourceError::from)?;
            Arc::new(OAuthRefreshCredentials::from_keyring(
                http,
                client_id.clone(),
                client_secret.clone(),
                &google.keyring_service,
                &google.keyring_user,
            )?)
        }
    };
    Ok(Arc::new(GoogleSheetsSource::new(credentials)?))
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Usage(format!("Could not start async runtime: {}", e)))
}

pub fn discover(ctx: &Context, source_id: i64) -> CliResult {
    let data_source = google_source(ctx)?;
    let mut conn = ctx.db.open()?;
    let spreadsheet = DbReader::get_source(&conn, source_id)?;
    let sheets = discover_sheets(&mut conn, data_source.as_ref(), &spreadsheet)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&sheets)?);
        return Ok(());
    }
    for sheet in sheets {
        println!("{:<32} {}", sheet.name, sheet.purpose);
    }
    Ok(())
}

pub fn sync(ctx: &Context, source_id: Option<i64>, sequential: bool) -> CliResult {
    let data_source = google_source(ctx)?;

    let report = if sequential {
        let mut conn = ctx.db.open()?;
        run_sync_job(&mut conn, data_source.as_ref(), source_id)?
    } else {
        let shared: Arc<dyn SpreadsheetDataSource> = data_source.clone();
        let rt = runtime()?;
        let report = rt.block_on(run_sync_job_concurrent(ctx.db.clone(), shared, source_id))?;
        drop(rt);
        report
    };
    // The last reference to the blocking client goes away here, outside the runtime
    drop(data_source);

    print_sync_report(ctx, &report)
}

pub fn append(
    ctx: &Context,
    source_id: i64,
    sheet: &str,
    values: &[String],
    assign_identifier: bool,
) -> CliResult {
    let data_source = google_source(ctx)?;
    let conn = ctx.db.open()?;
    let spreadsheet = DbReader::get_source(&conn, source_id)?;
    let appended = append_row(
        data_source.as_ref(),
        &spreadsheet,
        sheet,
        values,
        assign_identifier,
    )?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&appended)?);
        return Ok(());
    }
    match &appended.identifier {
        Some(id) => println!("{}/{}: appended row {}", spreadsheet.name, sheet, id),
        None => println!("{}/{}: appended {} cells", spreadsheet.name, sheet, appended.cells.len()),
    }
    Ok(())
}

fn print_sync_report(ctx: &Context, report: &SyncJobReport) -> CliResult {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for sheet in &report.sheets {
        let line = match &sheet.result {
            SheetSyncResult::Synced(o) => format!(
                "{} synced, {} skipped, {} deleted, {} errors",
                o.synced,
                o.skipped,
                o.deleted,
                o.errors.len()
            ),
            SheetSyncResult::Invalid { message } => format!("invalid: {}", message),
            SheetSyncResult::Failed { message } => format!("failed: {}", message),
        };
        println!("{}/{}: {}", sheet.source, sheet.sheet, line);
    }
    for failure in &report.failed_sources {
        println!("{}: failed: {}", failure.source, failure.error);
    }
    Ok(())
}

pub fn backfill(ctx: &Context, source_id: Option<i64>) -> CliResult {
    let data_source = google_source(ctx)?;
    let shared: Arc<dyn SpreadsheetDataSource> = data_source.clone();
    let throttle: Arc<dyn Throttle> = Arc::new(ThreadSleep);
    let settings = ctx.settings.backfill;

    let rt = runtime()?;
    let report = rt.block_on(run_backfill_job_concurrent(
        ctx.db.clone(),
        shared,
        throttle,
        settings.engine_config(),
        settings.retry_after(),
        source_id,
    ))?;
    drop(rt);
    drop(data_source);

    print_backfill_report(ctx, &report)
}

fn print_backfill_report(ctx: &Context, job: &BackfillJobReport) -> CliResult {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(job)?);
        return Ok(());
    }
    for source in &job.sources {
        if let Some(at) = source.retry_after {
            println!("{}: recently edited, retry after {}", source.source, at.to_rfc3339());
            continue;
        }
        for batch in &source.report.batches {
            let status = if batch.errors.is_empty() {
                "ok".to_string()
            } else {
                batch.errors.join("; ")
            };
            println!(
                "{}/{} batch {}: {} rows, {}",
                source.source, batch.sheet, batch.batch_number, batch.count, status
            );
        }
        for failure in &source.report.sheet_errors {
            println!("{}/{}: skipped: {}", source.source, failure.sheet, failure.error);
        }
        println!("{}: {} identifiers written", source.source, source.report.written());
    }
    for failure in &job.failed_sources {
        println!("{}: failed: {}", failure.source, failure.error);
    }
    Ok(())
}

pub fn store_refresh_token(ctx: &Context, refresh_token: &str) -> CliResult {
    let google = &ctx.settings.google;
    OAuthRefreshCredentials::store_refresh_token(
        &google.keyring_service,
        &google.keyring_user,
        refresh_token,
    )?;
    info!("Refresh token stored");
    println!(
        "Stored refresh token under {}/{}",
        google.keyring_service, google.keyring_user
    );
    Ok(())
}
