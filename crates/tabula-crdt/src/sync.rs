//! Replica sync: version vectors, incremental updates, snapshots.
//!
//! Transport is the caller's business. A replica sends its [`version`] to a
//! peer, the peer answers with [`ops_since`], and the replica applies the
//! bytes with [`merge_ops`]. Updates are idempotent and commutative, so
//! re-delivery and reordering are harmless.
//!
//! [`version`]: TableDocument::version
//! [`ops_since`]: TableDocument::ops_since
//! [`merge_ops`]: TableDocument::merge_ops

use loro::{ExportMode, LoroDoc, VersionVector};

use tabula_types::PeerId;

use crate::config::TableConfig;
use crate::document::TableDocument;
use crate::{Result, TableError};

impl TableDocument {
    /// Encoded version vector of everything this replica has seen.
    pub fn version(&self) -> Vec<u8> {
        self.store.doc().oplog_vv().encode()
    }

    /// Updates a replica at `version` is missing.
    ///
    /// An empty `version` means "everything".
    pub fn ops_since(&self, version: &[u8]) -> Result<Vec<u8>> {
        let doc = self.store.doc();
        let exported = if version.is_empty() {
            doc.export(ExportMode::all_updates())
        } else {
            let vv = VersionVector::decode(version)?;
            doc.export(ExportMode::updates(&vv))
        };
        exported.map_err(|e| TableError::Serialization(e.to_string()))
    }

    /// Apply updates from another replica.
    ///
    /// Change flows for the touched containers are published as remote.
    pub fn merge_ops(&mut self, ops: &[u8]) -> Result<()> {
        self.store.doc().import(ops).inspect_err(|e| {
            tracing::error!(document_id = %self.document_id(), error = %e, "merge failed");
        })?;
        self.refresh_undo_state();
        tracing::debug!(document_id = %self.document_id(), bytes = ops.len(), "merged remote ops");
        Ok(())
    }

    /// Full document snapshot for persistence or first sync.
    pub fn export_snapshot(&self) -> Result<Vec<u8>> {
        self.store
            .doc()
            .export(ExportMode::Snapshot)
            .map_err(|e| TableError::Serialization(e.to_string()))
    }

    /// Open a document from a snapshot, migrating if needed.
    pub fn from_snapshot(
        snapshot: &[u8],
        document_id: impl Into<String>,
        peer: PeerId,
        config: TableConfig,
    ) -> Result<Self> {
        let doc = LoroDoc::new();
        doc.import(snapshot)?;
        Self::open(doc, document_id, peer, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{OpSource, TableFlow};
    use tabula_types::CellValue;

    fn pair() -> (TableDocument, TableDocument) {
        let mut a = TableDocument::new("doc-1", PeerId::new()).unwrap();
        a.insert_columns(0, 1).unwrap();
        let b = TableDocument::from_snapshot(
            &a.export_snapshot().unwrap(),
            "doc-1",
            PeerId::new(),
            TableConfig::default(),
        )
        .unwrap();
        (a, b)
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_table() {
        let (a, b) = pair();
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(b.schema_version(), a.schema_version());
    }

    #[test]
    fn test_incremental_sync() {
        let (mut a, mut b) = pair();
        a.insert_rows(0, 1).unwrap();
        a.edit_cell_at(0, 0, CellValue::from("hi")).unwrap();

        let ops = a.ops_since(&b.version()).unwrap();
        b.merge_ops(&ops).unwrap();
        assert_eq!(b.cell_at(0, 0), Some(CellValue::from("hi")));

        // Re-delivery changes nothing.
        b.merge_ops(&ops).unwrap();
        assert_eq!(b.row_count(), 1);
    }

    #[test]
    fn test_merge_publishes_remote_flow() {
        let (mut a, mut b) = pair();
        let mut sub = b.subscribe("table.rows");
        a.insert_rows(0, 1).unwrap();
        b.merge_ops(&a.ops_since(&b.version()).unwrap()).unwrap();

        let flows = sub.drain();
        assert!(!flows.is_empty());
        assert!(flows.iter().all(|f| matches!(f, TableFlow::RowsChanged { source: OpSource::Remote, .. })));
    }

    #[test]
    fn test_remote_changes_are_not_undoable() {
        let (mut a, mut b) = pair();
        a.insert_rows(0, 1).unwrap();
        b.merge_ops(&a.ops_since(&b.version()).unwrap()).unwrap();
        assert!(!b.can_undo());
    }

    #[test]
    fn test_empty_version_exports_everything() {
        let (a, _) = pair();
        let mut c = TableDocument::new_for_sync("doc-1", PeerId::new(), TableConfig::default()).unwrap();
        c.merge_ops(&a.ops_since(&[]).unwrap()).unwrap();
        assert_eq!(c.column_count(), 1);
    }

    #[test]
    fn test_garbage_merge_is_error() {
        let (_, mut b) = pair();
        assert!(b.merge_ops(b"not an update").is_err());
    }
}
