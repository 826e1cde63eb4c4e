//! Replicated table document model for Tabula.
//!
//! A table is a grid of rows and columns shared by any number of concurrent
//! editors. Every row and column has a stable identity, so concurrent
//! inserts, deletes, reorders, and cell edits converge without clobbering one
//! another, and an edit aimed at a row still lands on that row after someone
//! else moves it.
//!
//! # Layers
//!
//! - [`store`]: the on-document layout and its read projections
//! - [`schema`]: version stamp and one-shot migration from the legacy
//!   positional layout
//! - [`TableDocument`]: the handle; mutations, locks, sync, and undo are all
//!   methods on it
//! - [`PresenceBridge`]: ephemeral remote cursors, never persisted
//! - [`flows`]: change notifications for renderers
//!
//! # Merge Semantics
//!
//! - **Order sequences**: movable lists; concurrent moves of one element
//!   resolve to a single position
//! - **Definitions, row data, locks**: maps; last writer wins per key
//! - **Presence**: per-peer clock, newest message wins

pub mod config;
mod document;
mod error;
pub mod flows;
mod locks;
mod mutation;
mod presence;
pub mod schema;
pub mod store;
mod sync;
mod undo;

pub use config::{ConfigError, TableConfig};
pub use document::{Origin, TableDocument};
pub use error::TableError;
pub use flows::{FlowBus, OpSource, SharedTableFlowBus, Subscription, TableFlow};
pub use mutation::{NewColumn, NewRow};
pub use presence::{PresenceBridge, PresenceUpdate};
pub use schema::{CURRENT_SCHEMA_VERSION, LegacyTable, MigrationOutcome};
pub use store::TableStore;
pub use undo::UndoScope;

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;
