//! Shared helpers for tabula-crdt integration tests.

#![allow(dead_code)]

use tabula_crdt::{TableConfig, TableDocument};
use tabula_types::PeerId;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A second replica of `doc`, built from its snapshot.
pub fn replica_of(doc: &TableDocument) -> TableDocument {
    replica_with_config(doc, TableConfig::default())
}

pub fn replica_with_config(doc: &TableDocument, config: TableConfig) -> TableDocument {
    TableDocument::from_snapshot(
        &doc.export_snapshot().unwrap(),
        doc.document_id(),
        PeerId::new(),
        config,
    )
    .unwrap()
}

/// Exchange missing updates in both directions.
pub fn sync_pair(a: &mut TableDocument, b: &mut TableDocument) {
    let va = a.version();
    let vb = b.version();
    let to_b = a.ops_since(&vb).unwrap();
    let to_a = b.ops_since(&va).unwrap();
    b.merge_ops(&to_b).unwrap();
    a.merge_ops(&to_a).unwrap();
}

/// Column headers in display order.
pub fn headers(doc: &TableDocument) -> Vec<String> {
    doc.columns_in_order().into_iter().map(|c| c.name).collect()
}
