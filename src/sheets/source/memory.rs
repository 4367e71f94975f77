// src/sheets/source/memory.rs
// In-process data source. Backs tests and offline runs; records every write it receives.

use super::{CellWrite, SourceError, SourceResult, SpreadsheetDataSource};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub external_id: String,
    pub sheet_name: String,
    pub cells: Vec<CellWrite>,
}

#[derive(Default)]
struct State {
    sheet_order: HashMap<String, Vec<String>>,
    grids: HashMap<(String, String), Vec<Vec<String>>>,
    modified: HashMap<String, DateTime<Utc>>,
    writes: Vec<RecordedWrite>,
    fetch_count: usize,
    failing_fetches: HashSet<(String, String)>,
    failing_probes: HashSet<String>,
    /// Zero-based indices of write calls that should fail.
    failing_writes: HashSet<usize>,
    write_attempts: usize,
}

#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace (or add) a tab. New tabs are appended to the listing order.
    pub fn set_grid(&self, external_id: &str, sheet_name: &str, grid: Vec<Vec<String>>) {
        let mut state = self.state();
        let order = state.sheet_order.entry(external_id.to_string()).or_default();
        if !order.iter().any(|s| s == sheet_name) {
            order.push(sheet_name.to_string());
        }
        state
            .grids
            .insert((external_id.to_string(), sheet_name.to_string()), grid);
    }

    /// Convenience wrapper taking string slices.
    pub fn set_rows(&self, external_id: &str, sheet_name: &str, rows: &[&[&str]]) {
        let grid = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        self.set_grid(external_id, sheet_name, grid);
    }

    pub fn grid(&self, external_id: &str, sheet_name: &str) -> Option<Vec<Vec<String>>> {
        self.state()
            .grids
            .get(&(external_id.to_string(), sheet_name.to_string()))
            .cloned()
    }

    pub fn set_last_modified(&self, external_id: &str, at: DateTime<Utc>) {
        self.state().modified.insert(external_id.to_string(), at);
    }

    pub fn fail_fetch(&self, external_id: &str, sheet_name: &str) {
        self.state()
            .failing_fetches
            .insert((external_id.to_string(), sheet_name.to_string()));
    }

    pub fn fail_probe(&self, external_id: &str) {
        self.state().failing_probes.insert(external_id.to_string());
    }

    pub fn fail_write_call(&self, call_index: usize) {
        self.state().failing_writes.insert(call_index);
    }

    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.state().write_attempts
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetch_count
    }
}

/// Zero-based column index for letters (A -> 0, AA -> 26).
fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, ch| {
        let ch = ch.to_ascii_uppercase();
        ch.is_ascii_uppercase()
            .then(|| acc * 26 + (ch as usize - 'A' as usize + 1))
    })
    .map(|n| n - 1)
}

impl SpreadsheetDataSource for MemorySource {
    fn list_sheets(&self, external_id: &str) -> SourceResult<Vec<String>> {
        self.state()
            .sheet_order
            .get(external_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(external_id.to_string()))
    }

    fn fetch_grid(&self, external_id: &str, sheet_name: &str) -> SourceResult<Vec<Vec<String>>> {
        let mut state = self.state();
        state.fetch_count += 1;
        let key = (external_id.to_string(), sheet_name.to_string());
        if state.failing_fetches.contains(&key) {
            return Err(SourceError::Other(format!(
                "fetch of {}/{} failed",
                external_id, sheet_name
            )));
        }
        state
            .grids
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", external_id, sheet_name)))
    }

    fn write_cells(
        &self,
        external_id: &str,
        sheet_name: &str,
        cells: &[CellWrite],
    ) -> SourceResult<()> {
        let mut state = self.state();
        let attempt = state.write_attempts;
        state.write_attempts += 1;
        if state.failing_writes.contains(&attempt) {
            return Err(SourceError::Status {
                operation: "values.batchUpdate".to_string(),
                status: 429,
                body: "rate limited".to_string(),
            });
        }

        let key = (external_id.to_string(), sheet_name.to_string());
        let grid = state
            .grids
            .get_mut(&key)
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", external_id, sheet_name)))?;
        for cell in cells {
            let col = column_index(&cell.address.column).ok_or_else(|| {
                SourceError::Other(format!("invalid column '{}'", cell.address.column))
            })?;
            let row_idx = cell
                .address
                .row
                .checked_sub(1)
                .ok_or_else(|| SourceError::Other("row numbers start at 1".to_string()))?;
            if grid.len() <= row_idx {
                grid.resize(row_idx + 1, Vec::new());
            }
            let row = &mut grid[row_idx];
            if row.len() <= col {
                row.resize(col + 1, String::new());
            }
            row[col] = cell.value.clone();
        }

        state.writes.push(RecordedWrite {
            external_id: external_id.to_string(),
            sheet_name: sheet_name.to_string(),
            cells: cells.to_vec(),
        });
        Ok(())
    }

    fn append_row(
        &self,
        external_id: &str,
        sheet_name: &str,
        values: &[String],
    ) -> SourceResult<()> {
        let mut state = self.state();
        let attempt = state.write_attempts;
        state.write_attempts += 1;
        if state.failing_writes.contains(&attempt) {
            return Err(SourceError::Status {
                operation: "values.append".to_string(),
                status: 429,
                body: "rate limited".to_string(),
            });
        }

        let key = (external_id.to_string(), sheet_name.to_string());
        let grid = state
            .grids
            .get_mut(&key)
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", external_id, sheet_name)))?;
        // Trailing blank rows do not count as populated
        while grid.last().is_some_and(|row| row.iter().all(|c| c.is_empty())) {
            grid.pop();
        }
        grid.push(values.to_vec());
        Ok(())
    }

    fn last_modified_time(&self, external_id: &str) -> SourceResult<DateTime<Utc>> {
        let state = self.state();
        if state.failing_probes.contains(external_id) {
            return Err(SourceError::Other(format!(
                "modified time probe for {} failed",
                external_id
            )));
        }
        state
            .modified
            .get(external_id)
            .copied()
            .ok_or_else(|| SourceError::NotFound(external_id.to_string()))
    }
}
