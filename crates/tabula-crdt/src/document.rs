//! Table document handle.
//!
//! [`TableDocument`] owns one replicated document and is the only way the UI
//! touches it. Every mutation is one substrate commit tagged with an
//! [`Origin`]; the origin decides whether the commit lands on the undo stack.
//!
//! # Change notification
//!
//! The document subscribes to each root container and republishes substrate
//! events as [`TableFlow`] messages on its flow bus, tagged local or remote.
//! Undo availability is re-read after every commit, undo, redo, and merge.

use std::sync::Arc;

use loro::{ContainerID, ContainerTrait, EventTriggerKind, LoroDoc};
use strum::EnumString;

use tabula_types::{ColumnDefinition, PeerId, RowSnapshot, TableSnapshot};

use crate::config::TableConfig;
use crate::flows::{OpSource, SharedTableFlowBus, Subscription, TableFlow, shared_table_flow_bus};
use crate::presence::PresenceBridge;
use crate::schema::{self, MigrationOutcome};
use crate::store::TableStore;
use crate::undo::UndoScope;
use crate::Result;

/// Commit origin tag.
///
/// Written as the commit origin string so the undo manager can exclude whole
/// classes of commits by prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Origin {
    /// Cell value edits.
    Edit,
    /// Row and column structure: insert, delete, reorder, rename, resize.
    Structure,
    /// Lock and unlock.
    Lock,
    /// Schema migration. Never undoable.
    Migrate,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Edit => "edit",
            Origin::Structure => "structure",
            Origin::Lock => "lock",
            Origin::Migrate => "migrate",
        }
    }
}

/// A replicated table document.
///
/// # Example
///
/// ```
/// use tabula_crdt::TableDocument;
/// use tabula_types::{CellValue, PeerId};
///
/// let mut doc = TableDocument::new("sheet-1", PeerId::new()).unwrap();
/// doc.insert_columns(0, 1).unwrap();
/// doc.insert_rows(0, 2).unwrap();
/// doc.edit_cell_at(0, 0, CellValue::from("hello")).unwrap();
///
/// let snapshot = doc.snapshot();
/// assert_eq!(snapshot.row_count(), 2);
/// assert_eq!(snapshot.rows[0].values[0], CellValue::from("hello"));
/// ```
pub struct TableDocument {
    /// Document ID, used for migration id derivation and flow payloads.
    document_id: String,

    /// This replica's participant id.
    peer: PeerId,

    /// Container handles over the shared document.
    pub(crate) store: TableStore,

    config: TableConfig,

    undo: UndoScope,

    flows: SharedTableFlowBus,

    /// Count of local transactions that completed.
    version: u64,

    /// Keeps the substrate subscriptions alive.
    _subscriptions: Vec<loro::Subscription>,
}

impl TableDocument {
    /// Create a fresh, empty table with default configuration.
    pub fn new(document_id: impl Into<String>, peer: PeerId) -> Result<Self> {
        Self::open(LoroDoc::new(), document_id, peer, TableConfig::default())
    }

    /// Create a fresh, empty table.
    pub fn with_config(
        document_id: impl Into<String>,
        peer: PeerId,
        config: TableConfig,
    ) -> Result<Self> {
        Self::open(LoroDoc::new(), document_id, peer, config)
    }

    /// Open an existing substrate document.
    ///
    /// Brings the document to the current schema first, then attaches the
    /// undo scope and change subscriptions. A document from a newer schema is
    /// rejected with [`crate::TableError::SchemaTooNew`].
    pub fn open(
        doc: LoroDoc,
        document_id: impl Into<String>,
        peer: PeerId,
        config: TableConfig,
    ) -> Result<Self> {
        let document_id = document_id.into();
        doc.set_peer_id(peer.replica_number())?;

        let outcome = schema::ensure_current_schema(&doc, &document_id, &config)?;
        let this = Self::attach(doc, document_id, peer, config);
        if let MigrationOutcome::Migrated { from_version, .. } = outcome {
            this.flows.publish(TableFlow::SchemaMigrated {
                document_id: this.document_id.clone(),
                from_version,
                to_version: schema::CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(this)
    }

    /// Create an empty replica that will receive its state through
    /// [`merge_ops`](Self::merge_ops).
    ///
    /// No schema stamp is written, so a replica joining a legacy document
    /// does not mask it. Call [`ensure_current_schema`](Self::ensure_current_schema)
    /// after the first merge.
    pub fn new_for_sync(
        document_id: impl Into<String>,
        peer: PeerId,
        config: TableConfig,
    ) -> Result<Self> {
        let doc = LoroDoc::new();
        doc.set_peer_id(peer.replica_number())?;
        Ok(Self::attach(doc, document_id.into(), peer, config))
    }

    fn attach(doc: LoroDoc, document_id: String, peer: PeerId, config: TableConfig) -> Self {
        let flows = shared_table_flow_bus(config.flow_capacity);
        let undo = UndoScope::new(&doc, &config);
        let store = TableStore::new(doc);
        let subscriptions = subscribe_containers(&store, &document_id, &flows);

        tracing::debug!(%document_id, peer = %peer.short(), "attached table document");

        Self {
            document_id,
            peer,
            store,
            config,
            undo,
            flows,
            version: 0,
            _subscriptions: subscriptions,
        }
    }

    /// Run migration on demand. See [`schema::ensure_current_schema`].
    pub fn ensure_current_schema(&mut self) -> Result<MigrationOutcome> {
        let outcome = schema::ensure_current_schema(self.store.doc(), &self.document_id, &self.config)?;
        if let MigrationOutcome::Migrated { from_version, .. } = outcome {
            self.flows.publish(TableFlow::SchemaMigrated {
                document_id: self.document_id.clone(),
                from_version,
                to_version: schema::CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(outcome)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Number of successful local transactions made through this handle.
    pub fn local_version(&self) -> u64 {
        self.version
    }

    /// The underlying substrate document.
    pub fn loro(&self) -> &LoroDoc {
        self.store.doc()
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn schema_version(&self) -> Option<i64> {
        schema::schema_version(self.store.doc())
    }

    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.store.column_count()
    }

    pub fn columns_in_order(&self) -> Vec<ColumnDefinition> {
        self.store.columns_in_order()
    }

    pub fn rows_in_order(&self) -> Vec<RowSnapshot> {
        self.store.rows_in_order()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.store.snapshot(&self.document_id)
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Shared flow bus handle.
    pub fn flows(&self) -> SharedTableFlowBus {
        Arc::clone(&self.flows)
    }

    /// Subscribe to change flows matching a subject pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<TableFlow> {
        self.flows.subscribe(pattern)
    }

    /// A presence bridge for this replica, publishing on this document's bus.
    ///
    /// Remote selections are clipped to this document's current extent, which
    /// the bridge follows through `table.*` flows.
    pub fn presence_bridge(&self, user: tabula_types::UserInfo) -> PresenceBridge {
        PresenceBridge::for_table(
            self.peer,
            user,
            std::time::Duration::from_millis(self.config.presence_timeout_ms),
            self.flows(),
            self.store.clone(),
        )
    }

    // =========================================================================
    // Undo
    // =========================================================================

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Undo the last local step. Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let undone = self.undo.undo()?;
        self.store.doc().commit();
        self.undo.end_split();
        self.refresh_undo_state();
        Ok(undone)
    }

    /// Redo the last undone step. Returns false when there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        let redone = self.undo.redo()?;
        self.store.doc().commit();
        self.undo.end_split();
        self.refresh_undo_state();
        Ok(redone)
    }

    /// Close the current undo group so the next commit starts a new step,
    /// even inside the merge interval.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.undo.checkpoint()
    }

    pub(crate) fn refresh_undo_state(&mut self) {
        if let Some(flow) = self.undo.take_state_change() {
            self.flows.publish(flow);
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` and commit whatever it wrote as one commit tagged `origin`.
    ///
    /// The substrate cannot roll back a pending transaction, so an operation
    /// is all-or-nothing only when it validates before the first write, which
    /// every caller does. If a substrate call still fails midway, the writes
    /// made so far are committed anyway; leaving them pending would fold them
    /// into the next operation's commit. A failed transaction is logged and
    /// not counted in [`local_version`](Self::local_version).
    pub(crate) fn transact<T>(
        &mut self,
        origin: Origin,
        f: impl FnOnce(&TableStore) -> Result<T>,
    ) -> Result<T> {
        let result = f(&self.store);

        self.store.doc().set_next_commit_origin(origin.as_str());
        self.store.doc().commit();
        self.undo.end_split();

        match &result {
            Ok(_) => self.version += 1,
            Err(e) => tracing::error!(
                document_id = %self.document_id,
                origin = origin.as_str(),
                error = %e,
                "table transaction failed, partial writes committed"
            ),
        }
        self.refresh_undo_state();
        result
    }
}

impl std::fmt::Debug for TableDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDocument")
            .field("document_id", &self.document_id)
            .field("peer", &self.peer)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Republish substrate events for each root container as table flows.
fn subscribe_containers(
    store: &TableStore,
    document_id: &str,
    flows: &SharedTableFlowBus,
) -> Vec<loro::Subscription> {
    type Classify = fn(String, OpSource) -> TableFlow;

    let rows: Classify = |document_id, source| TableFlow::RowsChanged { document_id, source };
    let columns: Classify = |document_id, source| TableFlow::ColumnsChanged { document_id, source };
    let locks: Classify = |document_id, source| TableFlow::LocksChanged { document_id, source };

    let targets: [(ContainerID, Classify); 7] = [
        (store.row_order().id(), rows),
        (store.rows().id(), rows),
        (store.cells().id(), rows),
        (store.column_order().id(), columns),
        (store.columns().id(), columns),
        (store.widths().id(), columns),
        (store.locks().id(), locks),
    ];

    targets
        .into_iter()
        .map(|(container, classify)| {
            let flows = Arc::clone(flows);
            let document_id = document_id.to_string();
            store.doc().subscribe(
                &container,
                Arc::new(move |event: loro::event::DiffEvent<'_>| {
                    let source = match event.triggered_by {
                        EventTriggerKind::Import => OpSource::Remote,
                        _ => OpSource::Local,
                    };
                    flows.publish(classify(document_id.clone(), source));
                }),
            )
        })
        .collect()
}
