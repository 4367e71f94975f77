// src/sheets/mod.rs

// --- Public Interface ---
pub mod definitions;
pub mod errors;
pub mod identifier;
pub mod purpose;
pub mod range;
pub mod sheet_grid_data;

// Storage and backend seams
pub mod database;
pub mod source;

// Engines and job runners
pub mod systems;

pub use definitions::{CachedRow, RowStatus, SheetRef, SpreadsheetSource};
pub use errors::{RowError, SyncError};
pub use purpose::PurposeTag;
pub use sheet_grid_data::{GridError, SheetGridData};
