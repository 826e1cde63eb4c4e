//! Cell locks.
//!
//! A lock is advisory: this module records which cells are locked and why,
//! and callers check [`TableDocument::is_locked`] or
//! [`TableDocument::is_any_locked`] before editing, deleting, or moving.
//! Nothing here vetoes a mutation.
//!
//! Records are keyed by cell identity (`"<row>:<col>"`), so a locked cell
//! stays locked when rows or columns are reordered around it. Deleting a row
//! or column removes its records in the same commit.

use std::collections::HashMap;

use loro::LoroMap;

use tabula_types::{CellRange, CellRef, ColumnId, LockId, LockRecord, LockedCell, RowId};

use crate::document::{Origin, TableDocument};
use crate::store::{cell_key, child_map, loro_str, map_keys, map_value, parse_cell_key};
use crate::Result;

const LOCK_ID: &str = "lock_id";
const NOTE: &str = "note";

fn read_record(record: &LoroMap) -> Option<LockRecord> {
    let lock_id = map_value(record, LOCK_ID)
        .and_then(|v| loro_str(&v))
        .and_then(|s| LockId::from_key(&s))?;
    let note = map_value(record, NOTE).and_then(|v| loro_str(&v));
    Some(LockRecord { lock_id, note })
}

impl TableDocument {
    /// Lock every cell in `range`, sharing one lock id and note.
    ///
    /// The range is normalized on construction. Returns `None` without
    /// writing when any part of it lies outside the table.
    pub fn lock_range(&mut self, range: CellRange, note: Option<&str>) -> Result<Option<LockId>> {
        let rows = self.store.row_ids();
        let cols = self.store.column_ids();
        if !range.fits(rows.len(), cols.len()) {
            tracing::warn!(?range, rows = rows.len(), cols = cols.len(), "lock_range: range outside table");
            return Ok(None);
        }

        let lock_id = LockId::new();
        let lock_key = lock_id.to_key();
        self.transact(Origin::Lock, |store| {
            let locks = store.locks();
            for cell in range.cells() {
                let record = locks.insert_container(&cell_key(&rows[cell.row], &cols[cell.col]), LoroMap::new())?;
                record.insert(LOCK_ID, lock_key.as_str())?;
                if let Some(note) = note {
                    record.insert(NOTE, note)?;
                }
            }
            Ok(())
        })?;

        tracing::debug!(lock = %lock_id.short(), cells = range.cell_count(), "locked range");
        Ok(Some(lock_id))
    }

    /// Remove lock records inside `range`, clipped to the table.
    ///
    /// Returns how many records were removed.
    pub fn unlock_range(&mut self, range: CellRange) -> Result<usize> {
        let rows = self.store.row_ids();
        let cols = self.store.column_ids();
        let Some(range) = range.clamp_to(rows.len(), cols.len()) else {
            tracing::warn!(?range, "unlock_range: range outside table");
            return Ok(0);
        };

        let locks = self.store.locks();
        let keys: Vec<String> = range
            .cells()
            .map(|cell| cell_key(&rows[cell.row], &cols[cell.col]))
            .filter(|key| locks.get(key).is_some())
            .collect();
        self.delete_lock_keys(keys)
    }

    /// Remove every lock record in one commit.
    pub fn unlock_all(&mut self) -> Result<usize> {
        let keys = map_keys(&self.store.locks());
        self.delete_lock_keys(keys)
    }

    /// Remove every record written by one [`lock_range`](Self::lock_range) call.
    pub fn unlock_by_id(&mut self, lock_id: &LockId) -> Result<usize> {
        let locks = self.store.locks();
        let keys: Vec<String> = map_keys(&locks)
            .into_iter()
            .filter(|key| {
                child_map(&locks, key)
                    .and_then(|record| read_record(&record))
                    .is_some_and(|record| record.lock_id == *lock_id)
            })
            .collect();
        self.delete_lock_keys(keys)
    }

    fn delete_lock_keys(&mut self, keys: Vec<String>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.transact(Origin::Lock, |store| {
            let locks = store.locks();
            for key in &keys {
                locks.delete(key)?;
            }
            tracing::debug!(count = keys.len(), "removed lock records");
            Ok(keys.len())
        })
    }

    /// The lock record on the cell at a display position.
    ///
    /// Positions outside the table read as unlocked.
    pub fn lock_at(&self, row: usize, col: usize) -> Option<LockRecord> {
        let row_id = self.store.row_id_at(row)?;
        let col_id = self.store.column_id_at(col)?;
        let record = child_map(&self.store.locks(), &cell_key(&row_id, &col_id))?;
        read_record(&record)
    }

    pub fn is_locked(&self, row: usize, col: usize) -> bool {
        self.lock_at(row, col).is_some()
    }

    /// The note on a locked cell, if it has one.
    pub fn note_for(&self, row: usize, col: usize) -> Option<String> {
        self.lock_at(row, col).and_then(|record| record.note)
    }

    /// Whether any cell of `range` inside the table is locked.
    pub fn is_any_locked(&self, range: CellRange) -> bool {
        let rows = self.store.row_ids();
        let cols = self.store.column_ids();
        let Some(range) = range.clamp_to(rows.len(), cols.len()) else {
            return false;
        };
        let locks = self.store.locks();
        range
            .cells()
            .any(|cell| locks.get(&cell_key(&rows[cell.row], &cols[cell.col])).is_some())
    }

    /// Every locked cell at its current position, in row-major order.
    ///
    /// Records whose row or column no longer exists are skipped.
    pub fn locked_cells(&self) -> Vec<LockedCell> {
        let row_index: HashMap<RowId, usize> = self
            .store
            .row_ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        let col_index: HashMap<ColumnId, usize> = self
            .store
            .column_ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let locks = self.store.locks();
        let mut cells: Vec<LockedCell> = map_keys(&locks)
            .into_iter()
            .filter_map(|key| {
                let (row_id, column_id) = parse_cell_key(&key)?;
                let row = *row_index.get(&row_id)?;
                let col = *col_index.get(&column_id)?;
                let record = read_record(&child_map(&locks, &key)?)?;
                Some(LockedCell {
                    cell: CellRef::new(row, col),
                    row_id,
                    column_id,
                    record,
                })
            })
            .collect();
        cells.sort_by_key(|locked| locked.cell);
        cells
    }
}
