//! Table document configuration.
//!
//! Loaded from RON. Every field has a default, so a config file only needs to
//! name what it changes:
//!
//! ```ron
//! (
//!     undo_merge_interval_ms: 800,
//!     undo_includes_locks: true,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Width given to columns that have no recorded width.
pub const DEFAULT_COLUMN_WIDTH: f64 = 150.0;

/// Tunables for one open table document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Width for new columns and for legacy headers without a stored width.
    pub default_column_width: f64,
    /// Commits closer together than this collapse into one undo step.
    pub undo_merge_interval_ms: i64,
    /// Undo stack depth.
    pub max_undo_steps: usize,
    /// Whether lock and unlock operations are undoable.
    pub undo_includes_locks: bool,
    /// Remote presence entries silent for longer than this are dropped.
    pub presence_timeout_ms: u64,
    /// Broadcast capacity of the change flow bus.
    pub flow_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            default_column_width: DEFAULT_COLUMN_WIDTH,
            undo_merge_interval_ms: 500,
            max_undo_steps: 100,
            undo_includes_locks: false,
            presence_timeout_ms: 30_000,
            flow_capacity: 256,
        }
    }
}

impl TableConfig {
    /// Parse a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path.as_ref())?;
        let text = std::str::from_utf8(&bytes)?;
        let config = Self::from_ron_str(text)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded table config");
        Ok(config)
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
