// src/sheets/systems/reconcile.rs
//! Pull one sheet from the backend and fold it into the row cache.
//!
//! All upserts and the final deletion sweep share one transaction. Each row runs
//! inside its own savepoint so a failing row is rolled back alone and reported,
//! while the pass as a whole either commits or leaves the cache untouched.

use crate::sheets::database::{DbResult, DbWriter, RowCacheStore};
use crate::sheets::definitions::{RowStatus, SpreadsheetSource};
use crate::sheets::errors::{RowError, SyncError};
use crate::sheets::sheet_grid_data::{sheet_row, SheetGridData};
use crate::sheets::source::SpreadsheetDataSource;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A repeated identifier within one fetch. Processing is last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateIdentifier {
    pub identifier: String,
    pub row_number: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    /// Active rows that disappeared from the sheet in this pass.
    pub deleted: usize,
    pub duplicates: Vec<DuplicateIdentifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowAction {
    Synced,
    Skipped,
}

pub struct ReconciliationEngine<'a> {
    source: &'a dyn SpreadsheetDataSource,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(source: &'a dyn SpreadsheetDataSource) -> Self {
        Self { source }
    }

    /// Fetch, validate and apply one sheet.
    ///
    /// Validation failures come back as [`SyncError::Invalid`] without touching the cache.
    /// Backend and storage failures propagate; the transaction is rolled back.
    pub fn reconcile(
        &self,
        conn: &mut Connection,
        spreadsheet: &SpreadsheetSource,
        sheet_name: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let raw = self.source.fetch_grid(&spreadsheet.external_id, sheet_name)?;
        let grid = SheetGridData::parse(raw, sheet_name, spreadsheet.name.as_str());
        grid.validate()?;

        let outcome = apply_grid(conn, spreadsheet.id, &grid, Utc::now())?;
        Ok(outcome)
    }
}

/// Apply an already validated grid to the cache in a single transaction.
pub fn apply_grid(
    conn: &mut Connection,
    source_id: i64,
    grid: &SheetGridData,
    synced_at: DateTime<Utc>,
) -> DbResult<SyncOutcome> {
    // Take the write lock up front so concurrent passes queue instead of failing mid-pass
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut outcome = SyncOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (row, position) in grid.rows_with_identifier() {
        let Some(identifier) = SheetGridData::identifier_for_row(row) else {
            continue;
        };
        let row_number = sheet_row(position);

        if !seen.insert(identifier.to_string()) {
            warn!(
                "Duplicate identifier '{}' at row {} of '{}'; the later row wins",
                identifier, row_number, grid.sheet_name
            );
            outcome.duplicates.push(DuplicateIdentifier {
                identifier: identifier.to_string(),
                row_number,
            });
        }

        match sync_row(&mut tx, source_id, &grid.sheet_name, identifier, row, row_number, synced_at) {
            Ok(RowAction::Synced) => outcome.synced += 1,
            Ok(RowAction::Skipped) => outcome.skipped += 1,
            Err(e) => {
                debug!("Row {} of '{}' failed: {}", row_number, grid.sheet_name, e);
                // Only flag a record this sheet already owns
                if RowCacheStore::find(&tx, source_id, &grid.sheet_name, identifier)?.is_some() {
                    RowCacheStore::mark_error(&tx, source_id, &grid.sheet_name, identifier)?;
                }
                outcome.errors.push(RowError {
                    row_number,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome.deleted =
        RowCacheStore::mark_missing_as_deleted(&tx, source_id, &grid.sheet_name, &seen)?;
    DbWriter::touch_sheet_synced(&tx, source_id, &grid.sheet_name, synced_at)?;
    tx.commit()?;

    Ok(outcome)
}

fn sync_row(
    tx: &mut Transaction<'_>,
    source_id: i64,
    sheet_name: &str,
    identifier: &str,
    content: &[String],
    row_number: usize,
    synced_at: DateTime<Utc>,
) -> DbResult<RowAction> {
    let sp = tx.savepoint()?;
    let mut cached = RowCacheStore::find_or_create(&sp, source_id, sheet_name, identifier)?;

    let row_number = row_number as i64;
    let moved = !cached.created && cached.row_number != row_number;
    // Deleted or errored rows that show up again go back to active even when unchanged
    let inactive = cached.status != RowStatus::Active;
    let action = if RowCacheStore::should_update(&cached, content) || moved || inactive {
        RowCacheStore::update_from_fetch(&sp, &mut cached, content, row_number, synced_at)?;
        RowAction::Synced
    } else {
        RowAction::Skipped
    };

    sp.commit()?;
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::database::{DbConnection, DbReader};
    use crate::sheets::sheet_grid_data::GridError;
    use crate::sheets::source::MemorySource;

    const EXT: &str = "ext-sales";

    fn setup() -> (Connection, SpreadsheetSource, MemorySource) {
        let conn = DbConnection::open_in_memory().unwrap();
        let spreadsheet = DbWriter::register_source(&conn, "Sales", EXT).unwrap();
        (conn, spreadsheet, MemorySource::new())
    }

    fn status_of(conn: &Connection, identifier: &str) -> RowStatus {
        DbReader::find_by_identifier(conn, identifier)
            .unwrap()
            .unwrap()
            .status
    }

    #[test]
    fn first_pass_creates_rows_with_identifier() {
        let (mut conn, spreadsheet, src) = setup();
        src.set_rows(
            EXT,
            "Main",
            &[&["UUID", "Name"], &["u1", "Alice"], &["", "Bob"], &["u3", "Carol"]],
        );

        let outcome = ReconciliationEngine::new(&src)
            .reconcile(&mut conn, &spreadsheet, "Main")
            .unwrap();
        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.errors.is_empty());

        let rows = DbReader::rows_for_sheet(&conn, spreadsheet.id, "Main", None).unwrap();
        let summary: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.identifier.as_str(), r.row_number))
            .collect();
        assert_eq!(summary, vec![("u1", 2), ("u3", 4)]);
        assert_eq!(rows[1].content, vec!["u3", "Carol"]);
    }

    #[test]
    fn second_identical_pass_skips_everything() {
        let (mut conn, spreadsheet, src) = setup();
        src.set_rows(EXT, "Main", &[&["UUID", "Name"], &["u1", "Alice"], &["u2", "Bob"]]);
        let engine = ReconciliationEngine::new(&src);

        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        let again = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!((again.synced, again.skipped, again.deleted), (0, 2, 0));
    }

    #[test]
    fn changed_content_is_synced() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "Name"], &["u1", "Alice"], &["u2", "Bob"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[&["UUID", "Name"], &["u1", "Alice"], &["u2", "Robert"]]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!((outcome.synced, outcome.skipped), (1, 1));
        let u2 = DbReader::find_by_identifier(&conn, "u2").unwrap().unwrap();
        assert_eq!(u2.content, vec!["u2", "Robert"]);
    }

    #[test]
    fn missing_rows_become_deleted_and_can_return() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID"], &["A"], &["B"], &["C"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[&["UUID"], &["A"], &["C"]]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(status_of(&conn, "A"), RowStatus::Active);
        assert_eq!(status_of(&conn, "B"), RowStatus::Deleted);
        assert_eq!(status_of(&conn, "C"), RowStatus::Active);

        src.set_rows(EXT, "Main", &[&["UUID"], &["A"], &["B"], &["C"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(status_of(&conn, "B"), RowStatus::Active);
    }

    #[test]
    fn unchanged_row_returning_after_deletion_is_reactivated() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"], &["b", "2"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(status_of(&conn, "b"), RowStatus::Deleted);

        // Same content at the same sheet row as before the deletion
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"], &["b", "2"]]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!((outcome.synced, outcome.skipped, outcome.deleted), (1, 1, 0));
        assert_eq!(status_of(&conn, "b"), RowStatus::Active);
    }

    #[test]
    fn errored_row_fetched_again_returns_to_active() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        RowCacheStore::mark_error(&conn, spreadsheet.id, "Main", "a").unwrap();

        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(status_of(&conn, "a"), RowStatus::Active);
    }

    #[test]
    fn failing_sweep_rolls_back_the_whole_pass() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"], &["b", "2"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        conn.execute_batch(
            "CREATE TRIGGER reject_sweep BEFORE UPDATE OF status ON cached_rows
             WHEN NEW.status = 'deleted'
             BEGIN SELECT RAISE(ABORT, 'sweep rejected'); END;",
        )
        .unwrap();

        // "b" disappears, "a" changes and "c" is new
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "changed"], &["c", "3"]]);
        let result = engine.reconcile(&mut conn, &spreadsheet, "Main");
        assert!(matches!(result, Err(SyncError::Db(_))));

        assert!(DbReader::find_by_identifier(&conn, "c").unwrap().is_none());
        let a = DbReader::find_by_identifier(&conn, "a").unwrap().unwrap();
        assert_eq!(a.content, vec!["a", "1"]);
        assert_eq!(status_of(&conn, "b"), RowStatus::Active);
    }

    #[test]
    fn moved_rows_take_their_new_position() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "1"], &["b", "2"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["new", "0"], &["b", "2"], &["a", "1"]]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        // "b" kept both its content and its row
        assert_eq!((outcome.synced, outcome.skipped), (2, 1));

        let active =
            DbReader::rows_for_sheet(&conn, spreadsheet.id, "Main", Some(RowStatus::Active))
                .unwrap();
        let positions: Vec<(&str, i64)> = active
            .iter()
            .map(|r| (r.identifier.as_str(), r.row_number))
            .collect();
        assert_eq!(positions, vec![("new", 2), ("b", 3), ("a", 4)]);
    }

    #[test]
    fn invalid_header_aborts_without_touching_cache() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID"], &["A"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[&["Id"], &["Z"]]);
        match engine.reconcile(&mut conn, &spreadsheet, "Main") {
            Err(SyncError::Invalid(GridError::HeaderMismatch { found, sheet, .. })) => {
                assert_eq!(found, "Id");
                assert_eq!(sheet, "Main");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(status_of(&conn, "A"), RowStatus::Active);
        assert!(DbReader::find_by_identifier(&conn, "Z").unwrap().is_none());
    }

    #[test]
    fn fetch_failure_propagates() {
        let (mut conn, spreadsheet, src) = setup();
        src.set_rows(EXT, "Main", &[&["UUID"], &["A"]]);
        src.fail_fetch(EXT, "Main");
        let result = ReconciliationEngine::new(&src).reconcile(&mut conn, &spreadsheet, "Main");
        assert!(matches!(result, Err(SyncError::Source(_))));
    }

    #[test]
    fn row_errors_are_collected_and_siblings_survive() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);

        // "shared" already belongs to another sheet, so inserting it here violates uniqueness
        src.set_rows(EXT, "Other", &[&["UUID"], &["shared"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Other").unwrap();

        src.set_rows(
            EXT,
            "Main",
            &[&["UUID", "N"], &["a", "1"], &["shared", "2"], &["c", "3"]],
        );
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row_number, 3);

        let main = DbReader::rows_for_sheet(&conn, spreadsheet.id, "Main", None).unwrap();
        assert_eq!(main.len(), 2);
        // The other sheet's record is left alone
        let shared = DbReader::find_by_identifier(&conn, "shared").unwrap().unwrap();
        assert_eq!(shared.sheet_name, "Other");
        assert_eq!(shared.status, RowStatus::Active);
    }

    #[test]
    fn failing_update_marks_owned_row_as_error() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "ok"], &["b", "ok"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        conn.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE UPDATE OF content ON cached_rows
             WHEN NEW.content LIKE '%poison%'
             BEGIN SELECT RAISE(ABORT, 'poisoned row'); END;",
        )
        .unwrap();

        src.set_rows(EXT, "Main", &[&["UUID", "N"], &["a", "poison"], &["b", "changed"]]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row_number, 2);
        assert!(outcome.errors[0].error.contains("poisoned row"));

        let a = DbReader::find_by_identifier(&conn, "a").unwrap().unwrap();
        assert_eq!(a.status, RowStatus::Error);
        assert_eq!(a.content, vec!["a", "ok"]);
        assert_eq!(status_of(&conn, "b"), RowStatus::Active);
    }

    #[test]
    fn duplicate_identifiers_are_reported_last_write_wins() {
        let (mut conn, spreadsheet, src) = setup();
        src.set_rows(
            EXT,
            "Main",
            &[&["UUID", "N"], &["dup", "first"], &["x", "1"], &["dup", "second"]],
        );
        let outcome = ReconciliationEngine::new(&src)
            .reconcile(&mut conn, &spreadsheet, "Main")
            .unwrap();
        assert_eq!(
            outcome.duplicates,
            vec![DuplicateIdentifier {
                identifier: "dup".into(),
                row_number: 4
            }]
        );
        let dup = DbReader::find_by_identifier(&conn, "dup").unwrap().unwrap();
        assert_eq!(dup.content, vec!["dup", "second"]);
        assert_eq!(dup.row_number, 4);
    }

    #[test]
    fn empty_sheet_marks_everything_deleted() {
        let (mut conn, spreadsheet, src) = setup();
        let engine = ReconciliationEngine::new(&src);
        src.set_rows(EXT, "Main", &[&["UUID"], &["a"]]);
        engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();

        src.set_rows(EXT, "Main", &[]);
        let outcome = engine.reconcile(&mut conn, &spreadsheet, "Main").unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(status_of(&conn, "a"), RowStatus::Deleted);
    }
}
