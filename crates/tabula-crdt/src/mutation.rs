//! Mutation engine: structural and cell edits on a [`TableDocument`].
//!
//! Every operation is one commit. Indices are positions in the current
//! display order and are validated before the first write; bad input is
//! logged and answered with a zero result, never an error. Errors are
//! substrate failures only.
//!
//! Structural operations compact their order sequence first (see
//! [`crate::store`]), so physical and visible positions agree for the rest of
//! the commit.

use std::collections::HashSet;

use tabula_types::{CellValue, ColumnId, RowId};

use crate::document::{Origin, TableDocument};
use crate::store::{Axis, cell_key, cell_to_loro, delete_cell_keys, raw_entries};
use crate::Result;

/// A row to insert with initial cell values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewRow {
    pub cells: Vec<(ColumnId, CellValue)>,
}

impl NewRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: ColumnId, value: impl Into<CellValue>) -> Self {
        self.cells.push((column, value.into()));
        self
    }
}

/// A column to insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewColumn {
    pub name: String,
    /// `None` takes the configured default width.
    pub width: Option<f64>,
}

impl NewColumn {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: None,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }
}

/// Sort descending and drop repeats, so deleting one at a time never shifts
/// a position still to be deleted.
fn descending_unique(indices: &[usize]) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
}

impl TableDocument {
    // =========================================================================
    // Rows
    // =========================================================================

    /// Insert `count` empty rows at `at` (clamped to the row count).
    ///
    /// Returns the number of rows inserted.
    pub fn insert_rows(&mut self, at: usize, count: usize) -> Result<usize> {
        if count == 0 {
            tracing::warn!(at, "insert_rows: count is zero");
            return Ok(0);
        }
        self.insert_rows_with(at, vec![NewRow::default(); count])
    }

    /// Insert rows carrying initial values at `at` (clamped to the row count).
    ///
    /// Cells naming a column that does not exist are dropped with a warning.
    /// Empty values are not stored.
    pub fn insert_rows_with(&mut self, at: usize, rows: Vec<NewRow>) -> Result<usize> {
        if rows.is_empty() {
            tracing::warn!(at, "insert_rows_with: no rows given");
            return Ok(0);
        }

        let live_columns: HashSet<ColumnId> = self.store.column_ids().into_iter().collect();
        self.transact(Origin::Structure, |store| {
            store.compact_rows()?;
            let order = store.row_order();
            let data = store.rows();
            let cells = store.cells();
            let at = at.min(order.len());

            for (offset, row) in rows.iter().enumerate() {
                let id = RowId::new();
                let key = id.to_key();
                data.insert(&key, true)?;
                for (column, value) in &row.cells {
                    if !live_columns.contains(column) {
                        tracing::warn!(column = %column.short(), "insert_rows_with: unknown column, dropping cell");
                        continue;
                    }
                    if value.is_empty() {
                        continue;
                    }
                    cells.insert(&cell_key(&id, column), cell_to_loro(value))?;
                }
                order.insert(at + offset, key.as_str())?;
            }

            tracing::debug!(at, count = rows.len(), "inserted rows");
            Ok(rows.len())
        })
    }

    /// Delete rows at the given positions.
    ///
    /// Positions may be unsorted and repeated. Positions past the end are
    /// skipped with a warning. Lock records on deleted rows go with them.
    /// Returns the number of rows deleted.
    pub fn delete_rows(&mut self, indices: &[usize]) -> Result<usize> {
        if indices.is_empty() {
            tracing::warn!("delete_rows: no indices given");
            return Ok(0);
        }
        let targets = descending_unique(indices);

        self.transact(Origin::Structure, |store| {
            store.compact_rows()?;
            let order = store.row_order();
            let data = store.rows();
            let cells = store.cells();
            let locks = store.locks();
            let mut deleted = 0;

            for index in targets {
                let len = order.len();
                if index >= len {
                    tracing::warn!(index, len, "delete_rows: index out of range, skipping");
                    continue;
                }
                let Some(Some(key)) = raw_entries(&order).into_iter().nth(index) else {
                    continue;
                };
                order.delete(index, 1)?;
                data.delete(&key)?;
                delete_cell_keys(&cells, Axis::Row, &key)?;
                delete_cell_keys(&locks, Axis::Row, &key)?;
                deleted += 1;
            }

            tracing::debug!(deleted, "deleted rows");
            Ok(deleted)
        })
    }

    /// Move the row at `from` so that it ends up at `to`.
    ///
    /// `from == to` is a no-op that commits nothing.
    pub fn reorder_row(&mut self, from: usize, to: usize) -> Result<bool> {
        let len = self.store.row_count();
        if from == to {
            return Ok(false);
        }
        if from >= len || to >= len {
            tracing::warn!(from, to, len, "reorder_row: index out of range");
            return Ok(false);
        }
        self.transact(Origin::Structure, |store| {
            store.compact_rows()?;
            store.row_order().mov(from, to)?;
            Ok(true)
        })
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Insert `count` columns at `at` (clamped), named `Column N`.
    pub fn insert_columns(&mut self, at: usize, count: usize) -> Result<usize> {
        if count == 0 {
            tracing::warn!(at, "insert_columns: count is zero");
            return Ok(0);
        }
        let existing = self.store.column_count();
        let columns = (0..count)
            .map(|i| NewColumn::named(format!("Column {}", existing + i + 1)))
            .collect();
        self.insert_columns_with(at, columns)
    }

    /// Insert the given columns at `at` (clamped to the column count).
    pub fn insert_columns_with(&mut self, at: usize, columns: Vec<NewColumn>) -> Result<usize> {
        if columns.is_empty() {
            tracing::warn!(at, "insert_columns_with: no columns given");
            return Ok(0);
        }
        let default_width = self.config().default_column_width;

        self.transact(Origin::Structure, |store| {
            store.compact_columns()?;
            let order = store.column_order();
            let names = store.columns();
            let widths = store.widths();
            let at = at.min(order.len());

            for (offset, column) in columns.iter().enumerate() {
                let key = ColumnId::new().to_key();
                names.insert(&key, column.name.as_str())?;
                widths.insert(&key, column.width.unwrap_or(default_width))?;
                order.insert(at + offset, key.as_str())?;
            }

            tracing::debug!(at, count = columns.len(), "inserted columns");
            Ok(columns.len())
        })
    }

    /// Delete columns at the given positions.
    ///
    /// Same input rules as [`delete_rows`](Self::delete_rows). The column's
    /// cells are stripped from every row and its lock records removed.
    pub fn delete_columns(&mut self, indices: &[usize]) -> Result<usize> {
        if indices.is_empty() {
            tracing::warn!("delete_columns: no indices given");
            return Ok(0);
        }
        let targets = descending_unique(indices);

        self.transact(Origin::Structure, |store| {
            store.compact_columns()?;
            let order = store.column_order();
            let names = store.columns();
            let widths = store.widths();
            let cells = store.cells();
            let locks = store.locks();
            let mut deleted = 0;

            for index in targets {
                let len = order.len();
                if index >= len {
                    tracing::warn!(index, len, "delete_columns: index out of range, skipping");
                    continue;
                }
                let Some(Some(key)) = raw_entries(&order).into_iter().nth(index) else {
                    continue;
                };
                order.delete(index, 1)?;
                names.delete(&key)?;
                widths.delete(&key)?;
                delete_cell_keys(&cells, Axis::Column, &key)?;
                delete_cell_keys(&locks, Axis::Column, &key)?;
                deleted += 1;
            }

            tracing::debug!(deleted, "deleted columns");
            Ok(deleted)
        })
    }

    /// Move the column at `from` so that it ends up at `to`.
    ///
    /// `to` is the final position in the resulting order. `from == to` is a
    /// no-op that commits nothing and records no undo step.
    pub fn reorder_column(&mut self, from: usize, to: usize) -> Result<bool> {
        let len = self.store.column_count();
        if from == to {
            return Ok(false);
        }
        if from >= len || to >= len {
            tracing::warn!(from, to, len, "reorder_column: index out of range");
            return Ok(false);
        }
        self.transact(Origin::Structure, |store| {
            store.compact_columns()?;
            store.column_order().mov(from, to)?;
            Ok(true)
        })
    }

    /// Rename the column at `col`. Identity and cells are unchanged.
    pub fn edit_header(&mut self, col: usize, name: &str) -> Result<bool> {
        let Some(id) = self.store.column_id_at(col) else {
            tracing::warn!(col, "edit_header: column out of range");
            return Ok(false);
        };
        self.transact(Origin::Structure, |store| {
            store.columns().insert(&id.to_key(), name)?;
            Ok(true)
        })
    }

    /// Set the width of the column at `col`.
    pub fn resize_column(&mut self, col: usize, width: f64) -> Result<bool> {
        if !width.is_finite() || width < 0.0 {
            tracing::warn!(col, width, "resize_column: invalid width");
            return Ok(false);
        }
        let Some(id) = self.store.column_id_at(col) else {
            tracing::warn!(col, "resize_column: column out of range");
            return Ok(false);
        };
        self.transact(Origin::Structure, |store| {
            store.widths().insert(&id.to_key(), width)?;
            Ok(true)
        })
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Set one cell by identity. An empty value clears the cell.
    ///
    /// Returns false without committing when the row or column does not
    /// exist, or when clearing a cell that holds nothing.
    pub fn edit_cell(&mut self, row: &RowId, col: &ColumnId, value: CellValue) -> Result<bool> {
        if !self.store.has_column(col) {
            tracing::warn!(col = %col.short(), "edit_cell: unknown column");
            return Ok(false);
        }
        if !self.store.has_row(row) {
            tracing::warn!(row = %row.short(), "edit_cell: unknown row");
            return Ok(false);
        }
        let key = cell_key(row, col);
        if value.is_empty() && self.store.cells().get(&key).is_none() {
            return Ok(false);
        }

        self.transact(Origin::Edit, |store| {
            let cells = store.cells();
            if value.is_empty() {
                cells.delete(&key)?;
            } else {
                cells.insert(&key, cell_to_loro(&value))?;
            }
            Ok(true)
        })
    }

    /// Set one cell by display position.
    pub fn edit_cell_at(&mut self, row: usize, col: usize, value: CellValue) -> Result<bool> {
        let (Some(row_id), Some(col_id)) = (self.store.row_id_at(row), self.store.column_id_at(col)) else {
            tracing::warn!(row, col, "edit_cell_at: cell out of range");
            return Ok(false);
        };
        self.edit_cell(&row_id, &col_id, value)
    }

    /// Current value of a cell by display position. Missing cells read empty.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<CellValue> {
        let row_id = self.store.row_id_at(row)?;
        let col_id = self.store.column_id_at(col)?;
        Some(
            self.store
                .cell_value(&row_id, &col_id)
                .unwrap_or_else(CellValue::empty),
        )
    }
}
