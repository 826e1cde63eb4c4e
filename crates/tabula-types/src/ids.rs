//! Typed identifiers for columns, rows, peers, and locks.
//!
//! All ID types wrap a UUID. Freshly minted IDs are UUIDv7 (time-ordered,
//! globally unique); IDs produced by schema migration are UUIDv5 derived from
//! the document and the legacy position, so every participant that migrates
//! the same legacy table mints the same IDs.
//!
//! On the substrate, IDs are stored as their 32-char hex form (`to_key()`).
//! The `short()` form is for logs only, never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when an ID string is not a UUID.
pub type IdParseError = uuid::Error;

/// A column identifier. Stable across renames, resizes, and reorders.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(uuid::Uuid);

/// A row identifier. Stable across inserts, deletes, and reorders of other rows.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(uuid::Uuid);

/// A participant identifier (one per open replica).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(uuid::Uuid);

/// Identifier shared by every cell record written by one `lock_range` call.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for human display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Substrate key form. Same as `to_hex()`.
            pub fn to_key(&self) -> String {
                self.to_hex()
            }

            /// Parse a substrate key. Returns `None` for anything that is not a UUID.
            pub fn from_key(key: &str) -> Option<Self> {
                Self::parse(key).ok()
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(ColumnId, "ColumnId");
impl_typed_id!(RowId, "RowId");
impl_typed_id!(PeerId, "PeerId");
impl_typed_id!(LockId, "LockId");

// ── Deterministic derivation ────────────────────────────────────────────────

/// Fixed namespace for IDs derived during schema migration.
const TABULA_MIGRATION_NS: uuid::Uuid = uuid::uuid!("5c1f7a42-9e3b-4d18-b6a0-2f8e91c4d7b3");

fn derive(document_id: &str, kind: &str, seed: &str) -> uuid::Uuid {
    let name = format!("{document_id}/{kind}/{seed}");
    uuid::Uuid::new_v5(&TABULA_MIGRATION_NS, name.as_bytes())
}

impl ColumnId {
    /// Derive the column ID for a legacy header at `position`.
    ///
    /// Same document, position, and header always give the same ID.
    pub fn derived(document_id: &str, position: usize, header: &str) -> Self {
        Self(derive(document_id, "column", &format!("{position}:{header}")))
    }
}

impl RowId {
    /// Derive the row ID for the legacy row at `position`.
    pub fn derived(document_id: &str, position: usize) -> Self {
        Self(derive(document_id, "row", &position.to_string()))
    }
}

impl PeerId {
    /// Low 64 bits of the random portion, used as the substrate peer number.
    pub fn replica_number(&self) -> u64 {
        let bytes = self.as_bytes();
        let mut low = [0u8; 8];
        low.copy_from_slice(&bytes[8..16]);
        u64::from_be_bytes(low)
    }
}

// ============================================================================
// Tests
// ============================================================================
