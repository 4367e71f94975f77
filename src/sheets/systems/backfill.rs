// src/sheets/systems/backfill.rs
//! Write freshly generated identifiers into rows that have content but no identifier.
//!
//! A source edited within the guard window is skipped as a whole. Writes go out in
//! fixed-size batches, one request per batch, with a pause between batches. Each batch
//! stands alone: a failed batch is reported and the next one is still attempted.

use crate::sheets::definitions::SpreadsheetSource;
use crate::sheets::identifier;
use crate::sheets::range::CellAddress;
use crate::sheets::sheet_grid_data::SheetGridData;
use crate::sheets::source::{CellWrite, SpreadsheetDataSource};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);
pub const DEFAULT_GUARD_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Sources modified more recently than this are left alone.
    pub guard_window: chrono::Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            guard_window: chrono::Duration::minutes(DEFAULT_GUARD_MINUTES),
        }
    }
}

/// How the engine waits between batches.
pub trait Throttle: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Throttle for ThreadSleep {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub sheet: String,
    pub batch_number: usize,
    pub count: usize,
    pub errors: Vec<String>,
}

/// A sheet that could not be inspected at all (fetch or validation failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetFailure {
    pub sheet: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// The freshness guard fired; nothing was fetched or written.
    pub skipped_recent_activity: bool,
    pub batches: Vec<BatchOutcome>,
    pub sheet_errors: Vec<SheetFailure>,
}

impl BackfillReport {
    pub fn written(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.errors.is_empty())
            .map(|b| b.count)
            .sum()
    }
}

pub struct BackfillEngine<'a> {
    source: &'a dyn SpreadsheetDataSource,
    config: BackfillConfig,
    throttle: &'a dyn Throttle,
}

impl<'a> BackfillEngine<'a> {
    pub fn new(
        source: &'a dyn SpreadsheetDataSource,
        config: BackfillConfig,
        throttle: &'a dyn Throttle,
    ) -> Self {
        Self {
            source,
            config,
            throttle,
        }
    }

    /// True when the spreadsheet changed inside the guard window.
    /// A failed probe counts as recent activity.
    pub fn recently_edited(&self, spreadsheet: &SpreadsheetSource) -> bool {
        self.recently_edited_at(spreadsheet, Utc::now())
    }

    fn recently_edited_at(&self, spreadsheet: &SpreadsheetSource, now: DateTime<Utc>) -> bool {
        match self.source.last_modified_time(&spreadsheet.external_id) {
            Ok(modified) => modified > now - self.config.guard_window,
            Err(e) => {
                error!(
                    "Could not read modification time of '{}': {}",
                    spreadsheet.name, e
                );
                true
            }
        }
    }

    pub fn backfill(&self, spreadsheet: &SpreadsheetSource, sheet_names: &[String]) -> BackfillReport {
        let mut report = BackfillReport::default();

        if self.recently_edited(spreadsheet) {
            info!(
                "Skipping identifier backfill for '{}': edited within the last {} minutes",
                spreadsheet.name,
                self.config.guard_window.num_minutes()
            );
            report.skipped_recent_activity = true;
            return report;
        }

        for sheet_name in sheet_names {
            match self.missing_rows(spreadsheet, sheet_name) {
                Ok(rows) if rows.is_empty() => {
                    debug!("'{}/{}' has no rows missing identifiers", spreadsheet.name, sheet_name);
                }
                Ok(rows) => {
                    let batches = self.write_batches(spreadsheet, sheet_name, &rows);
                    report.batches.extend(batches);
                }
                Err(message) => {
                    error!("{}", message);
                    report.sheet_errors.push(SheetFailure {
                        sheet: sheet_name.clone(),
                        error: message,
                    });
                }
            }
        }

        report
    }

    fn missing_rows(
        &self,
        spreadsheet: &SpreadsheetSource,
        sheet_name: &str,
    ) -> Result<Vec<usize>, String> {
        let raw = self
            .source
            .fetch_grid(&spreadsheet.external_id, sheet_name)
            .map_err(|e| format!("Failed to fetch '{}/{}': {}", spreadsheet.name, sheet_name, e))?;
        let grid = SheetGridData::parse(raw, sheet_name, spreadsheet.name.as_str());
        grid.validate().map_err(|e| e.to_string())?;
        Ok(grid
            .missing_identifier_rows()
            .into_iter()
            .map(|m| m.row_number)
            .collect())
    }

    fn write_batches(
        &self,
        spreadsheet: &SpreadsheetSource,
        sheet_name: &str,
        rows: &[usize],
    ) -> Vec<BatchOutcome> {
        let batch_size = self.config.batch_size.max(1);
        let total = rows.len().div_ceil(batch_size);
        let mut outcomes = Vec::with_capacity(total);

        for (index, chunk) in rows.chunks(batch_size).enumerate() {
            if index > 0 {
                self.throttle.pause(self.config.batch_pause);
            }

            let cells: Vec<CellWrite> = chunk
                .iter()
                .map(|&row| CellWrite::new(CellAddress::identifier_cell(row), identifier::generate()))
                .collect();

            let batch_number = index + 1;
            let errors = match self
                .source
                .write_cells(&spreadsheet.external_id, sheet_name, &cells)
            {
                Ok(()) => {
                    info!(
                        "Backfilled {} identifiers in '{}/{}' (batch {}/{})",
                        cells.len(),
                        spreadsheet.name,
                        sheet_name,
                        batch_number,
                        total
                    );
                    Vec::new()
                }
                Err(e) => {
                    error!(
                        "Identifier batch {}/{} for '{}/{}' failed: {}",
                        batch_number, total, spreadsheet.name, sheet_name, e
                    );
                    vec![e.to_string()]
                }
            };

            outcomes.push(BatchOutcome {
                sheet: sheet_name.to_string(),
                batch_number,
                count: cells.len(),
                errors,
            });
        }

        outcomes
    }
}
