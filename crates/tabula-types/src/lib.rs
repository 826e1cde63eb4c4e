//! Shared identity and value types for tabula.
//!
//! This crate is the leaf of the workspace: typed IDs, cell values, cell
//! addressing, projection snapshots, and presence records. It has **no
//! substrate dependency**. Everything here is plain data that the document
//! model reads out of, or writes into, the replicated document.
//!
//! # Entity Overview
//!
//! ```text
//! Table (document_id)
//!     └── ColumnOrder: [ColumnId]      → ColumnDefinition { name, width }
//!     └── RowOrder:    [RowId]         → { ColumnId → CellValue } (sparse)
//!     └── Locks:       (RowId, ColumnId) → LockRecord { lock_id, note }
//!
//! Peer (PeerId) ← one open replica
//!     └── PresenceState { user, selection } (ephemeral)
//! ```
//!
//! # Key Types
//!
//! |----------------------|-------------------------------------------|
//! | Type                 | Purpose                                   |
//! |----------------------|-------------------------------------------|
//! | [`ColumnId`]         | Stable column identity                    |
//! | [`RowId`]            | Stable row identity                       |
//! | [`PeerId`]           | Which replica / participant               |
//! | [`LockId`]           | Which `lock_range` call wrote a record    |
//! | [`CellValue`]        | string / number / boolean / null          |
//! | [`CellRange`]        | Normalized inclusive rectangle            |
//! | [`TableSnapshot`]    | Columns + resolved rows for rendering     |
//! | [`PresenceState`]    | Ephemeral per-peer selection              |
//! |----------------------|-------------------------------------------|

pub mod cell;
pub mod ids;
pub mod presence;
pub mod table;

pub use cell::{CellRange, CellRef, CellValue};
pub use ids::{ColumnId, IdParseError, LockId, PeerId, RowId};
pub use presence::{PresenceState, RemoteCursor, Selection, UserInfo};
pub use table::{ColumnDefinition, LockRecord, LockedCell, RowSnapshot, TableSnapshot};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
