//! Ordering store: the identity-addressed table layout on the substrate.
//!
//! # Document Structure
//!
//! ```text
//! ROOT
//! ├── meta (Map)
//! │   ├── schema_version (I64)          # gates migration
//! │   ├── migrated_by (Str)             # peer hex of the migrating replica
//! │   └── migrated_at (I64)             # unix millis
//! ├── column_order (MovableList<Str>)   # ColumnId keys, left → right
//! ├── row_order (MovableList<Str>)      # RowId keys, top → bottom
//! ├── columns (Map)                     # ColumnId key → name (Str), LWW
//! ├── widths (Map)                      # ColumnId key → F64, LWW
//! ├── rows (Map)                        # RowId key → true
//! ├── cells (Map)                       # "<row>:<col>" → Null|Bool|F64|Str (sparse)
//! └── locks (Map)                       # "<row>:<col>" → Map
//!     └── <cell> (Map)
//!         ├── lock_id (Str)
//!         └── note (Str, optional)
//! ```
//!
//! Definitions and cells are plain values under root maps rather than nested
//! containers. Two replicas writing the same key then race on a value, which
//! last-writer-wins settles, instead of each creating its own child container
//! and one of them losing every later edit made inside it. A write made after
//! seeing a key always outranks a concurrent write of that key from the same
//! causal depth, so edits made right after a racing migration survive it.
//!
//! Order sequences are read with first-occurrence-wins deduplication and only
//! yield ids that still have a definition (columns) or row entry (rows). Two
//! replicas that concurrently insert the same id can therefore never show a
//! row twice; the next structural mutation compacts the hidden entries away.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use loro::{Container, LoroDoc, LoroMap, LoroMovableList, LoroResult, LoroValue, ValueOrContainer};

use tabula_types::{CellValue, ColumnDefinition, ColumnId, RowId, RowSnapshot, TableSnapshot};

use crate::config::DEFAULT_COLUMN_WIDTH;

pub(crate) const META: &str = "meta";
pub(crate) const COLUMN_ORDER: &str = "column_order";
pub(crate) const ROW_ORDER: &str = "row_order";
pub(crate) const COLUMNS: &str = "columns";
pub(crate) const WIDTHS: &str = "widths";
pub(crate) const ROWS: &str = "rows";
pub(crate) const CELLS: &str = "cells";
pub(crate) const LOCKS: &str = "locks";

/// Key of one cell in the `cells` and `locks` maps.
pub(crate) fn cell_key(row: &RowId, col: &ColumnId) -> String {
    format!("{}:{}", row.to_key(), col.to_key())
}

pub(crate) fn parse_cell_key(key: &str) -> Option<(RowId, ColumnId)> {
    let (row, col) = key.split_once(':')?;
    Some((RowId::from_key(row)?, ColumnId::from_key(col)?))
}

/// Which half of a cell key to match in [`delete_cell_keys`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
    Row,
    Column,
}

/// Delete every entry of a cell-keyed map whose row or column half is `key`.
///
/// Returns how many entries were removed.
pub(crate) fn delete_cell_keys(map: &LoroMap, axis: Axis, key: &str) -> LoroResult<usize> {
    let mut removed = 0;
    for cell in map_keys(map) {
        let Some((row, col)) = cell.split_once(':') else {
            continue;
        };
        let side = match axis {
            Axis::Row => row,
            Axis::Column => col,
        };
        if side == key {
            map.delete(&cell)?;
            removed += 1;
        }
    }
    Ok(removed)
}

// ============================================================================
// Value conversion
// ============================================================================

pub(crate) fn cell_to_loro(value: &CellValue) -> LoroValue {
    match value {
        CellValue::Null => LoroValue::Null,
        CellValue::Bool(b) => LoroValue::from(*b),
        CellValue::Number(n) => LoroValue::from(*n),
        CellValue::Text(s) => LoroValue::from(s.as_str()),
    }
}

pub(crate) fn cell_from_loro(value: &LoroValue) -> Option<CellValue> {
    match value {
        LoroValue::Null => Some(CellValue::Null),
        LoroValue::Bool(b) => Some(CellValue::Bool(*b)),
        LoroValue::Double(n) => Some(CellValue::Number(*n)),
        LoroValue::I64(n) => Some(CellValue::Number(*n as f64)),
        LoroValue::String(s) => Some(CellValue::Text(s.to_string())),
        _ => None,
    }
}

pub(crate) fn loro_str(value: &LoroValue) -> Option<String> {
    match value {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

pub(crate) fn loro_f64(value: &LoroValue) -> Option<f64> {
    match value {
        LoroValue::Double(n) => Some(*n),
        LoroValue::I64(n) => Some(*n as f64),
        _ => None,
    }
}

pub(crate) fn loro_i64(value: &LoroValue) -> Option<i64> {
    match value {
        LoroValue::I64(n) => Some(*n),
        LoroValue::Double(n) => Some(*n as i64),
        _ => None,
    }
}

/// Read a plain value out of a map slot.
pub(crate) fn map_value(map: &LoroMap, key: &str) -> Option<LoroValue> {
    match map.get(key)? {
        ValueOrContainer::Value(v) => Some(v),
        _ => None,
    }
}

/// Read a nested map out of a map slot.
pub(crate) fn child_map(map: &LoroMap, key: &str) -> Option<LoroMap> {
    match map.get(key)? {
        ValueOrContainer::Container(Container::Map(m)) => Some(m),
        _ => None,
    }
}

/// Keys of a map, in the substrate's iteration order.
pub(crate) fn map_keys(map: &LoroMap) -> Vec<String> {
    let mut keys = Vec::with_capacity(map.len());
    map.for_each(|key, _| keys.push(key.to_string()));
    keys
}

/// Raw string entries of an order sequence, duplicates and orphans included.
pub(crate) fn raw_entries(list: &LoroMovableList) -> Vec<Option<String>> {
    match list.get_value() {
        LoroValue::List(items) => items.iter().map(loro_str).collect(),
        _ => Vec::new(),
    }
}

/// Visible keys of an order sequence: first occurrence wins, and only keys in
/// `live` are kept.
fn visible_keys(list: &LoroMovableList, live: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw_entries(list)
        .into_iter()
        .flatten()
        .filter(|key| live.contains(key) && seen.insert(key.clone()))
        .collect()
}

/// Remove hidden entries (duplicates, orphans, non-strings) from an order
/// sequence so that physical positions equal visible positions.
///
/// Deletes back to front so earlier positions stay valid. Returns how many
/// entries were removed.
fn compact(list: &LoroMovableList, live: &HashSet<String>) -> LoroResult<usize> {
    let mut seen = HashSet::new();
    let hidden: Vec<usize> = raw_entries(list)
        .into_iter()
        .enumerate()
        .filter_map(|(pos, key)| match key {
            Some(key) if live.contains(&key) && seen.insert(key.clone()) => None,
            _ => Some(pos),
        })
        .collect();

    for &pos in hidden.iter().rev() {
        list.delete(pos, 1)?;
    }
    if !hidden.is_empty() {
        tracing::debug!(removed = hidden.len(), "compacted order sequence");
    }
    Ok(hidden.len())
}

// ============================================================================
// TableStore
// ============================================================================

/// Handle onto the table containers of one document.
///
/// Cloning shares the underlying document.
#[derive(Clone)]
pub struct TableStore {
    doc: LoroDoc,
}

impl TableStore {
    pub fn new(doc: LoroDoc) -> Self {
        Self { doc }
    }

    pub(crate) fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    // =========================================================================
    // Containers
    // =========================================================================

    pub(crate) fn meta(&self) -> LoroMap {
        self.doc.get_map(META)
    }

    pub(crate) fn column_order(&self) -> LoroMovableList {
        self.doc.get_movable_list(COLUMN_ORDER)
    }

    pub(crate) fn row_order(&self) -> LoroMovableList {
        self.doc.get_movable_list(ROW_ORDER)
    }

    pub(crate) fn columns(&self) -> LoroMap {
        self.doc.get_map(COLUMNS)
    }

    pub(crate) fn widths(&self) -> LoroMap {
        self.doc.get_map(WIDTHS)
    }

    pub(crate) fn rows(&self) -> LoroMap {
        self.doc.get_map(ROWS)
    }

    pub(crate) fn cells(&self) -> LoroMap {
        self.doc.get_map(CELLS)
    }

    pub(crate) fn locks(&self) -> LoroMap {
        self.doc.get_map(LOCKS)
    }

    fn live_column_keys(&self) -> HashSet<String> {
        map_keys(&self.columns()).into_iter().collect()
    }

    fn live_row_keys(&self) -> HashSet<String> {
        map_keys(&self.rows()).into_iter().collect()
    }

    pub(crate) fn compact_columns(&self) -> LoroResult<usize> {
        compact(&self.column_order(), &self.live_column_keys())
    }

    pub(crate) fn compact_rows(&self) -> LoroResult<usize> {
        compact(&self.row_order(), &self.live_row_keys())
    }

    // =========================================================================
    // Identity accessors
    // =========================================================================

    pub(crate) fn column_keys(&self) -> Vec<String> {
        visible_keys(&self.column_order(), &self.live_column_keys())
    }

    pub(crate) fn row_keys(&self) -> Vec<String> {
        visible_keys(&self.row_order(), &self.live_row_keys())
    }

    /// Column ids in display order.
    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.column_keys()
            .iter()
            .filter_map(|k| ColumnId::from_key(k))
            .collect()
    }

    /// Row ids in display order.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.row_keys()
            .iter()
            .filter_map(|k| RowId::from_key(k))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.column_keys().len()
    }

    pub fn row_count(&self) -> usize {
        self.row_keys().len()
    }

    pub fn column_id_at(&self, index: usize) -> Option<ColumnId> {
        self.column_ids().get(index).copied()
    }

    pub fn row_id_at(&self, index: usize) -> Option<RowId> {
        self.row_ids().get(index).copied()
    }

    pub fn row_index(&self, id: &RowId) -> Option<usize> {
        self.row_ids().iter().position(|r| r == id)
    }

    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.column_ids().iter().position(|c| c == id)
    }

    pub fn has_row(&self, id: &RowId) -> bool {
        self.rows().get(&id.to_key()).is_some()
    }

    pub fn has_column(&self, id: &ColumnId) -> bool {
        self.columns().get(&id.to_key()).is_some()
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// One column definition by id.
    pub fn column(&self, id: &ColumnId) -> Option<ColumnDefinition> {
        let key = id.to_key();
        let name = map_value(&self.columns(), &key).and_then(|v| loro_str(&v))?;
        let width = map_value(&self.widths(), &key)
            .and_then(|v| loro_f64(&v))
            .unwrap_or(DEFAULT_COLUMN_WIDTH);
        Some(ColumnDefinition::new(*id, name, width))
    }

    /// Column definitions in column order.
    pub fn columns_in_order(&self) -> Vec<ColumnDefinition> {
        self.column_ids()
            .iter()
            .filter_map(|id| self.column(id))
            .collect()
    }

    /// Every stored cell grouped by row, in one pass over the cell map.
    ///
    /// Entries whose row or column no longer exists are skipped; a concurrent
    /// edit to a deleted row leaves such entries behind.
    fn stored_cells(&self) -> HashMap<RowId, HashMap<ColumnId, CellValue>> {
        let rows = self.live_row_keys();
        let columns = self.live_column_keys();
        let mut grouped: HashMap<RowId, HashMap<ColumnId, CellValue>> = HashMap::new();
        self.cells().for_each(|key, value| {
            let ValueOrContainer::Value(value) = value else {
                return;
            };
            let Some((row_key, col_key)) = key.split_once(':') else {
                return;
            };
            if !rows.contains(row_key) || !columns.contains(col_key) {
                return;
            }
            let (Some((row, col)), Some(cell)) = (parse_cell_key(key), cell_from_loro(&value)) else {
                return;
            };
            grouped.entry(row).or_default().insert(col, cell);
        });
        grouped
    }

    /// The sparse stored cells of one row, keyed by column id.
    ///
    /// Entries for columns that no longer exist are skipped.
    pub fn row_cells(&self, id: &RowId) -> Option<HashMap<ColumnId, CellValue>> {
        if !self.has_row(id) {
            return None;
        }
        Some(self.stored_cells().remove(id).unwrap_or_default())
    }

    /// The stored value of one cell. `None` when the row or the entry is absent.
    pub fn cell_value(&self, row: &RowId, col: &ColumnId) -> Option<CellValue> {
        if !self.has_row(row) {
            return None;
        }
        map_value(&self.cells(), &cell_key(row, col)).and_then(|v| cell_from_loro(&v))
    }

    /// Rows in row order, resolved against `columns`.
    fn resolve_rows(&self, columns: &[ColumnDefinition]) -> Vec<RowSnapshot> {
        let mut stored = self.stored_cells();
        self.row_ids()
            .into_iter()
            .map(|id| {
                let cells_of_row = stored.remove(&id).unwrap_or_default();
                let values: Vec<CellValue> = columns
                    .iter()
                    .map(|c| cells_of_row.get(&c.id).cloned().unwrap_or_else(CellValue::empty))
                    .collect();
                let cells: IndexMap<String, CellValue> = columns
                    .iter()
                    .zip(values.iter())
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect();
                RowSnapshot { id, cells, values }
            })
            .collect()
    }

    /// Rows in row order with cells keyed by column name.
    pub fn rows_in_order(&self) -> Vec<RowSnapshot> {
        self.resolve_rows(&self.columns_in_order())
    }

    /// Full projection for rendering.
    pub fn snapshot(&self, document_id: &str) -> TableSnapshot {
        let columns = self.columns_in_order();
        let rows = self.resolve_rows(&columns);
        TableSnapshot {
            document_id: document_id.to_string(),
            columns,
            rows,
        }
    }

    /// Physical lengths of the order sequences, hidden entries included.
    #[cfg(test)]
    pub(crate) fn physical_lengths(&self) -> (usize, usize) {
        (self.column_order().len(), self.row_order().len())
    }
}
