//! Table projection types.
//!
//! These are plain snapshots read out of the replicated document. They carry
//! no substrate handles and can be handed to a renderer or serialized freely.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::{CellRef, CellValue};
use crate::ids::{ColumnId, LockId, RowId};

/// One column: identity plus the mutable header fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub id: ColumnId,
    pub name: String,
    pub width: f64,
}

impl ColumnDefinition {
    pub fn new(id: ColumnId, name: impl Into<String>, width: f64) -> Self {
        Self {
            id,
            name: name.into(),
            width,
        }
    }
}

/// One row resolved against the current column order.
///
/// `cells` is keyed by column name in column order. Every current column has
/// an entry; sparse (missing) cells read as [`CellValue::empty`]. When two
/// columns share a name, the rightmost one wins in `cells`; use
/// `values` for position-exact access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    pub id: RowId,
    pub cells: IndexMap<String, CellValue>,
    /// Values aligned with the column order.
    pub values: Vec<CellValue>,
}

impl RowSnapshot {
    /// Value by column name.
    pub fn get(&self, column_name: &str) -> Option<&CellValue> {
        self.cells.get(column_name)
    }

    /// Value by column position.
    pub fn value_at(&self, col: usize) -> Option<&CellValue> {
        self.values.get(col)
    }
}

/// The whole table as the UI sees it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub document_id: String,
    pub columns: Vec<ColumnDefinition>,
    pub rows: Vec<RowSnapshot>,
}

impl TableSnapshot {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Value at a display position.
    pub fn value(&self, cell: CellRef) -> Option<&CellValue> {
        self.rows.get(cell.row)?.value_at(cell.col)
    }

    /// Column names in order.
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// The persisted lock record for one cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_id: LockId,
    pub note: Option<String>,
}

/// A locked cell as projected for the UI: where it is now, and its record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCell {
    pub cell: CellRef,
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub record: LockRecord,
}
