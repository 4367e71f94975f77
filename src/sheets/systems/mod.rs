// src/sheets/systems/mod.rs

pub mod append;
pub mod backfill;
pub mod discovery;
pub mod jobs;
pub mod reconcile;

pub use append::{append_row, AppendedRow};
pub use backfill::{BackfillConfig, BackfillEngine, BackfillReport, BatchOutcome, ThreadSleep, Throttle};
pub use discovery::discover_sheets;
pub use jobs::{
    run_backfill_job, run_backfill_job_concurrent, run_sync_job, run_sync_job_concurrent,
    BackfillJobReport, SheetSyncReport, SheetSyncResult, SyncJobReport,
};
pub use reconcile::{ReconciliationEngine, SyncOutcome};
