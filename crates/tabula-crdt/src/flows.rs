//! FlowBus pub/sub for table change notifications.
//!
//! Every observable change to a table document is published as a
//! [`TableFlow`] on a [`FlowBus`]. A renderer subscribes with a NATS-style
//! subject pattern and redraws the projection named by the subject:
//!
//! | Subject            | Projection to refresh                  |
//! |--------------------|----------------------------------------|
//! | `table.rows`       | rows / cells                           |
//! | `table.columns`    | headers / widths (and row alignment)   |
//! | `table.locks`      | lock set                               |
//! | `presence.changed` | remote cursors                         |
//! | `undo.state`       | undo / redo affordances                |
//! | `schema.migrated`  | everything                             |
//!
//! # Pattern Matching
//!
//! - `*` matches exactly one token: `table.*` matches `table.rows`
//! - `>` matches one or more tokens (only at end): `>` matches everything
//! - Exact match: `table.locks` only matches `table.locks`

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tabula_types::PeerId;

/// Where a change came from.
///
/// Local changes were made through this replica's API; remote changes arrived
/// through `merge_ops` or a presence message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpSource {
    #[default]
    Local,
    Remote,
}

/// Whether a dotted `subject` is selected by `pattern`.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut want = pattern.split('.').peekable();
    let mut got = subject.split('.');

    while let Some(token) = want.next() {
        match (token, got.next()) {
            (_, None) => return false,
            // Tail wildcard swallows the rest, but only as the last token.
            (">", Some(_)) => return want.peek().is_none(),
            ("*", Some(_)) => {}
            (literal, Some(actual)) if literal == actual => {}
            _ => return false,
        }
    }
    got.next().is_none()
}

/// Payloads routed by subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

// ============================================================================
// Table Flow Events
// ============================================================================

/// Table change events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TableFlow {
    /// Row order or any row's cells changed.
    RowsChanged { document_id: String, source: OpSource },

    /// Column order or any column definition changed.
    ColumnsChanged { document_id: String, source: OpSource },

    /// The lock set changed.
    LocksChanged { document_id: String, source: OpSource },

    /// Remote presence changed for these peers.
    PresenceChanged { peers: Vec<PeerId>, source: OpSource },

    /// Undo or redo availability flipped.
    UndoStateChanged { can_undo: bool, can_redo: bool },

    /// The document was migrated at open.
    SchemaMigrated {
        document_id: String,
        from_version: i64,
        to_version: i64,
    },
}

impl TableFlow {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::RowsChanged { .. } => "table.rows",
            Self::ColumnsChanged { .. } => "table.columns",
            Self::LocksChanged { .. } => "table.locks",
            Self::PresenceChanged { .. } => "presence.changed",
            Self::UndoStateChanged { .. } => "undo.state",
            Self::SchemaMigrated { .. } => "schema.migrated",
        }
    }

    /// Get the source of this event. Undo and migration events are always local.
    pub fn source(&self) -> OpSource {
        match self {
            Self::RowsChanged { source, .. }
            | Self::ColumnsChanged { source, .. }
            | Self::LocksChanged { source, .. }
            | Self::PresenceChanged { source, .. } => *source,
            Self::UndoStateChanged { .. } | Self::SchemaMigrated { .. } => OpSource::Local,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.source() == OpSource::Remote
    }
}

impl HasSubject for TableFlow {
    fn subject(&self) -> &str {
        TableFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Broadcast bus for subject-tagged payloads.
///
/// Publishing never blocks. Subscribers that fall more than `capacity`
/// messages behind lose the oldest ones.
#[derive(Debug)]
pub struct FlowBus<T: Clone> {
    tx: broadcast::Sender<T>,
    capacity: usize,
}

impl<T: Clone + HasSubject> FlowBus<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a payload. Returns how many subscribers it reached; with none
    /// it is dropped.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(payload).unwrap_or(0)
    }

    /// Subscribe to payloads whose subject matches `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Shared bus handle; one per open document.
pub type SharedTableFlowBus = Arc<FlowBus<TableFlow>>;

pub fn shared_table_flow_bus(capacity: usize) -> SharedTableFlowBus {
    Arc::new(FlowBus::new(capacity))
}

/// A pattern-filtered receiver on a [`FlowBus`].
///
/// Renderers poll it between frames; nothing here waits.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + HasSubject> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The next queued payload matching the pattern, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(payload) if matches_pattern(&self.pattern, payload.subject()) => {
                    return Some(payload);
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "flow subscriber fell behind");
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    /// Drain every matching payload currently queued.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_exact() {
        assert!(matches_pattern("table.rows", "table.rows"));
        assert!(!matches_pattern("table.rows", "table.columns"));
        assert!(!matches_pattern("table.rows", "table.rows.extra"));
    }

    #[test]
    fn test_pattern_matching_wildcards() {
        assert!(matches_pattern("table.*", "table.locks"));
        assert!(!matches_pattern("table.*", "presence.changed"));
        assert!(matches_pattern(">", "undo.state"));
        assert!(matches_pattern("table.>", "table.rows"));
        assert!(!matches_pattern("table.>", "table"));
        assert!(!matches_pattern(">.rows", "table.rows"));
        assert!(matches_pattern("*.changed", "presence.changed"));
        assert!(!matches_pattern("*.*", "presence"));
    }

    #[test]
    fn test_subjects() {
        let doc = "doc-1".to_string();
        assert_eq!(
            TableFlow::RowsChanged { document_id: doc.clone(), source: OpSource::Local }.subject(),
            "table.rows"
        );
        assert_eq!(
            TableFlow::LocksChanged { document_id: doc, source: OpSource::Remote }.subject(),
            "table.locks"
        );
        assert_eq!(
            TableFlow::UndoStateChanged { can_undo: true, can_redo: false }.subject(),
            "undo.state"
        );
    }

    #[test]
    fn test_subscription_filters_by_pattern() {
        let bus = FlowBus::<TableFlow>::new(16);
        let mut locks = bus.subscribe("table.locks");
        let mut all = bus.subscribe(">");

        bus.publish(TableFlow::RowsChanged {
            document_id: "d".into(),
            source: OpSource::Local,
        });
        bus.publish(TableFlow::LocksChanged {
            document_id: "d".into(),
            source: OpSource::Remote,
        });

        let got = locks.try_recv().unwrap();
        assert_eq!(got.subject(), "table.locks");
        assert!(got.is_remote());
        assert!(locks.try_recv().is_none());
        assert_eq!(all.drain().len(), 2);
    }

    #[test]
    fn test_lagging_subscriber_keeps_newest() {
        let bus = FlowBus::<TableFlow>::new(2);
        let mut sub = bus.subscribe("undo.state");
        for can_undo in [false, true, false] {
            bus.publish(TableFlow::UndoStateChanged { can_undo, can_redo: false });
        }

        let got = sub.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1], TableFlow::UndoStateChanged { can_undo: false, can_redo: false });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = FlowBus::<TableFlow>::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        let delivered = bus.publish(TableFlow::UndoStateChanged {
            can_undo: false,
            can_redo: false,
        });
        assert_eq!(delivered, 0);
    }
}
