//! Undo/redo scope over the table containers.
//!
//! Wraps the substrate's per-peer undo manager. Only this replica's commits
//! are undoable; remote changes are transformed through, never reverted.
//! Commits tagged [`Origin::Migrate`] are always excluded, and
//! [`Origin::Lock`] commits are excluded unless the config opts in.

use loro::{LoroDoc, UndoManager};

use crate::config::TableConfig;
use crate::document::Origin;
use crate::flows::TableFlow;
use crate::Result;

pub struct UndoScope {
    manager: UndoManager,
    /// Configured grouping window, restored after a forced split.
    merge_interval_ms: i64,
    /// Set by [`checkpoint`](Self::checkpoint) until the next local commit.
    split_pending: bool,
    /// Last observed `(can_undo, can_redo)`.
    observed: (bool, bool),
}

impl UndoScope {
    pub fn new(doc: &LoroDoc, config: &TableConfig) -> Self {
        let mut manager = UndoManager::new(doc);
        manager.set_merge_interval(config.undo_merge_interval_ms);
        manager.set_max_undo_steps(config.max_undo_steps);
        manager.add_exclude_origin_prefix(Origin::Migrate.as_str());
        if !config.undo_includes_locks {
            manager.add_exclude_origin_prefix(Origin::Lock.as_str());
        }
        let observed = (manager.can_undo(), manager.can_redo());
        Self {
            manager,
            merge_interval_ms: config.undo_merge_interval_ms,
            split_pending: false,
            observed,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }

    /// Undo one step. A no-op returning false on an empty stack.
    pub fn undo(&mut self) -> Result<bool> {
        if !self.manager.can_undo() {
            tracing::debug!("undo: stack empty");
            return Ok(false);
        }
        Ok(self.manager.undo()?)
    }

    /// Redo one step. A no-op returning false on an empty stack.
    pub fn redo(&mut self) -> Result<bool> {
        if !self.manager.can_redo() {
            tracing::debug!("redo: stack empty");
            return Ok(false);
        }
        Ok(self.manager.redo()?)
    }

    /// End the current merge group.
    ///
    /// The manager only starts a new step when a commit falls outside the
    /// merge interval, so the interval is zeroed until the next local commit
    /// reports back through [`end_split`](Self::end_split).
    pub fn checkpoint(&mut self) -> Result<()> {
        self.manager.record_new_checkpoint()?;
        self.manager.set_merge_interval(0);
        self.split_pending = true;
        Ok(())
    }

    /// Restore the configured merge interval after a forced split.
    pub(crate) fn end_split(&mut self) {
        if self.split_pending {
            self.manager.set_merge_interval(self.merge_interval_ms);
            self.split_pending = false;
        }
    }

    /// Re-read availability; returns a flow if either flag flipped.
    pub(crate) fn take_state_change(&mut self) -> Option<TableFlow> {
        let now = (self.manager.can_undo(), self.manager.can_redo());
        if now == self.observed {
            return None;
        }
        self.observed = now;
        Some(TableFlow::UndoStateChanged {
            can_undo: now.0,
            can_redo: now.1,
        })
    }
}

impl std::fmt::Debug for UndoScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoScope")
            .field("can_undo", &self.observed.0)
            .field("can_redo", &self.observed.1)
            .finish()
    }
}
