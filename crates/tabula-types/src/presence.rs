//! Presence (awareness) value types.
//!
//! Presence is ephemeral: who is looking at the table, which cells they have
//! selected, and what color to draw them in. None of this is persisted.

use serde::{Deserialize, Serialize};

use crate::cell::{CellRange, CellRef};
use crate::ids::PeerId;

/// How a participant is drawn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    /// CSS-style color string, e.g. `#e07a5f`.
    pub color: String,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// A selection from an anchor cell to a focus cell (either order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: CellRef,
    pub end: CellRef,
}

impl Selection {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        Self { start, end }
    }

    /// A single-cell cursor.
    pub fn cursor(cell: CellRef) -> Self {
        Self::new(cell, cell)
    }

    /// The normalized rectangle covered by this selection.
    pub fn range(&self) -> CellRange {
        CellRange::from_corners(self.start, self.end)
    }
}

/// One participant's presence record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub user: UserInfo,
    pub selection: Option<Selection>,
}

/// A remote participant drawn on a cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub peer: PeerId,
    pub user: UserInfo,
}
