// src/lib.rs
//! Keeps a local SQLite cache of spreadsheet rows in step with Google Sheets,
//! keyed by a time-ordered identifier stored in column A of every row.

pub mod cli;
pub mod settings;
pub mod sheets;
