//! Cell values and cell addressing.
//!
//! `CellValue` is what a cell holds. `CellRef` and `CellRange` address cells by
//! their *current display position* (row index, column index). Positions are
//! transient: they are resolved against the order sequences at the moment of
//! the call and never stored on the substrate.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// The value of one cell.
///
/// Serializes untagged so JSON interchange reads naturally:
/// `null`, `true`, `30`, `"Alice"`.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// The value a missing sparse entry stands for.
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// Null and the empty string are both "empty".
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert from a JSON value. Arrays and objects have no cell form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(CellValue::Null),
            serde_json::Value::Bool(b) => Some(CellValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number),
            serde_json::Value::String(s) => Some(CellValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// A cell position in the current display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// An inclusive rectangle of cells.
///
/// Constructed from two corners in any order; `new` normalizes so that
/// `start_* <= end_*` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl CellRange {
    /// Build a normalized range from possibly reversed bounds.
    pub fn new(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start_row: start_row.min(end_row),
            end_row: start_row.max(end_row),
            start_col: start_col.min(end_col),
            end_col: start_col.max(end_col),
        }
    }

    /// Range spanned by two corner cells (e.g. a drag selection).
    pub fn from_corners(a: CellRef, b: CellRef) -> Self {
        Self::new(a.row, b.row, a.col, b.col)
    }

    /// A single-cell range.
    pub fn single(cell: CellRef) -> Self {
        Self::new(cell.row, cell.row, cell.col, cell.col)
    }

    pub fn rows(&self) -> RangeInclusive<usize> {
        self.start_row..=self.end_row
    }

    pub fn cols(&self) -> RangeInclusive<usize> {
        self.start_col..=self.end_col
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        self.rows().contains(&cell.row) && self.cols().contains(&cell.col)
    }

    pub fn cell_count(&self) -> usize {
        (self.end_row - self.start_row + 1) * (self.end_col - self.start_col + 1)
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.rows()
            .flat_map(move |row| self.cols().map(move |col| CellRef::new(row, col)))
    }

    /// Intersect with a `row_count` × `col_count` table.
    ///
    /// Returns `None` when nothing of the range lies inside the table.
    pub fn clamp_to(&self, row_count: usize, col_count: usize) -> Option<Self> {
        if row_count == 0 || col_count == 0 {
            return None;
        }
        if self.start_row >= row_count || self.start_col >= col_count {
            return None;
        }
        Some(Self {
            start_row: self.start_row,
            end_row: self.end_row.min(row_count - 1),
            start_col: self.start_col,
            end_col: self.end_col.min(col_count - 1),
        })
    }

    /// Whether the whole range lies inside a `row_count` × `col_count` table.
    pub fn fits(&self, row_count: usize, col_count: usize) -> bool {
        self.end_row < row_count && self.end_col < col_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_normalizes_reversed_bounds() {
        let r = CellRange::new(4, 1, 3, 0);
        assert_eq!(r.start_row, 1);
        assert_eq!(r.end_row, 4);
        assert_eq!(r.start_col, 0);
        assert_eq!(r.end_col, 3);
        assert_eq!(r.cell_count(), 16);
    }

    #[test]
    fn test_range_cells_row_major() {
        let r = CellRange::new(0, 1, 0, 1);
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(
            cells,
            vec![
                CellRef::new(0, 0),
                CellRef::new(0, 1),
                CellRef::new(1, 0),
                CellRef::new(1, 1),
            ]
        );
    }

    #[test]
    fn test_range_clamp() {
        let r = CellRange::new(1, 10, 0, 10);
        let clamped = r.clamp_to(3, 2).unwrap();
        assert_eq!(clamped, CellRange::new(1, 2, 0, 1));
        assert!(r.clamp_to(1, 5).is_none());
        assert!(r.clamp_to(0, 0).is_none());
        assert!(!r.fits(3, 2));
        assert!(CellRange::new(0, 2, 0, 1).fits(3, 2));
    }

    #[test]
    fn test_range_contains() {
        let r = CellRange::from_corners(CellRef::new(2, 2), CellRef::new(0, 1));
        assert!(r.contains(CellRef::new(1, 1)));
        assert!(r.contains(CellRef::new(2, 2)));
        assert!(!r.contains(CellRef::new(3, 2)));
        assert!(!r.contains(CellRef::new(0, 0)));
    }

    #[test]
    fn test_cell_value_emptiness() {
        assert!(CellValue::Null.is_empty());
        assert!(CellValue::empty().is_empty());
        assert!(!CellValue::from(0.0).is_empty());
        assert!(!CellValue::from(false).is_empty());
        assert!(!CellValue::from("x").is_empty());
    }

    #[test]
    fn test_cell_value_json_untagged() {
        let values = vec![
            CellValue::Null,
            CellValue::Bool(true),
            CellValue::Number(30.0),
            CellValue::from("Alice"),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,true,30.0,"Alice"]"#);
        let parsed: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_cell_value_from_json_rejects_containers() {
        assert_eq!(
            CellValue::from_json(&serde_json::json!(30)),
            Some(CellValue::Number(30.0))
        );
        assert_eq!(CellValue::from_json(&serde_json::json!([1, 2])), None);
        assert_eq!(CellValue::from_json(&serde_json::json!({"a": 1})), None);
    }
}
