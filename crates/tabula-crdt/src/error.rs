//! Error types for table document operations.
//!
//! Only failures that make a call meaningless are errors. Bad indices, empty
//! operand lists, and ranges outside the table are logged and answered with a
//! zero or partial result instead.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while opening or mutating a table document.
#[derive(Error, Debug)]
pub enum TableError {
    /// The document was written by a newer schema than this build understands.
    #[error("document schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    /// A root container holds something other than the expected layout.
    #[error("malformed document layout: {0}")]
    MalformedLayout(String),

    /// The substrate rejected a write, import, or undo step.
    #[error("substrate error: {0}")]
    Substrate(#[from] loro::LoroError),

    /// Encoding or decoding a document update failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A presence message could not be decoded.
    #[error("presence decode error: {0}")]
    Presence(#[from] postcard::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
