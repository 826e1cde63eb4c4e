//! Undo grouping and scope.

mod common;

use common::{headers, init_tracing, replica_with_config};
use tabula_crdt::{TableConfig, TableDocument, TableFlow};
use tabula_types::{CellRange, CellRef, CellValue, PeerId};

fn config(merge_ms: i64) -> TableConfig {
    TableConfig {
        undo_merge_interval_ms: merge_ms,
        ..Default::default()
    }
}

/// A one-row, one-column table whose history is not on the undo stack.
fn table(merge_ms: i64) -> TableDocument {
    let mut origin = TableDocument::new("undo", PeerId::new()).unwrap();
    origin.insert_columns(0, 2).unwrap();
    origin.insert_rows(0, 1).unwrap();
    replica_with_config(&origin, config(merge_ms))
}

#[test]
fn rapid_edits_group_into_one_step() {
    init_tracing();
    let mut doc = table(500);
    assert!(!doc.can_undo());

    doc.edit_cell_at(0, 0, "h".into()).unwrap();
    doc.edit_cell_at(0, 0, "he".into()).unwrap();
    doc.edit_cell_at(0, 0, "hey".into()).unwrap();

    assert!(doc.undo().unwrap());
    assert_eq!(doc.cell_at(0, 0), Some(CellValue::empty()));
    assert!(!doc.can_undo());
}

#[test]
fn zero_interval_undoes_one_commit_at_a_time() {
    init_tracing();
    let mut doc = table(0);

    doc.edit_cell_at(0, 0, "h".into()).unwrap();
    doc.edit_cell_at(0, 0, "he".into()).unwrap();

    assert!(doc.undo().unwrap());
    assert_eq!(doc.cell_at(0, 0), Some("h".into()));
    assert!(doc.undo().unwrap());
    assert_eq!(doc.cell_at(0, 0), Some(CellValue::empty()));
}

#[test]
fn checkpoint_splits_a_group() {
    init_tracing();
    let mut doc = table(10_000);

    doc.edit_cell_at(0, 0, "one".into()).unwrap();
    doc.checkpoint().unwrap();
    doc.edit_cell_at(0, 1, "two".into()).unwrap();

    doc.undo().unwrap();
    assert_eq!(doc.cell_at(0, 0), Some("one".into()));
    assert_eq!(doc.cell_at(0, 1), Some(CellValue::empty()));
}

#[test]
fn redo_reapplies() {
    init_tracing();
    let mut doc = table(0);
    doc.edit_header(0, "Renamed").unwrap();

    doc.undo().unwrap();
    assert_eq!(headers(&doc)[0], "Column 1");
    assert!(doc.can_redo());

    assert!(doc.redo().unwrap());
    assert_eq!(headers(&doc)[0], "Renamed");
}

#[test]
fn empty_stacks_are_noops() {
    init_tracing();
    let mut doc = table(0);
    assert!(!doc.undo().unwrap());
    assert!(!doc.redo().unwrap());
}

#[test]
fn same_index_reorder_records_no_step() {
    init_tracing();
    let mut doc = table(0);

    assert!(!doc.reorder_column(1, 1).unwrap());
    assert!(!doc.can_undo());

    assert!(doc.reorder_column(0, 1).unwrap());
    assert!(doc.can_undo());
}

#[test]
fn structural_undo_restores_order() {
    init_tracing();
    let mut doc = table(0);
    let before = headers(&doc);

    doc.reorder_column(0, 1).unwrap();
    assert_ne!(headers(&doc), before);
    doc.undo().unwrap();
    assert_eq!(headers(&doc), before);
}

#[test]
fn locks_stay_out_of_undo_by_default() {
    init_tracing();
    let mut doc = table(0);
    doc.lock_range(CellRange::single(CellRef::new(0, 0)), Some("hold")).unwrap();
    assert!(!doc.can_undo());
    assert!(doc.is_locked(0, 0));
}

#[test]
fn locks_undoable_when_configured() {
    init_tracing();
    let mut origin = TableDocument::new("undo", PeerId::new()).unwrap();
    origin.insert_columns(0, 1).unwrap();
    origin.insert_rows(0, 1).unwrap();
    let mut doc = replica_with_config(
        &origin,
        TableConfig {
            undo_includes_locks: true,
            ..config(0)
        },
    );

    doc.lock_range(CellRange::single(CellRef::new(0, 0)), None).unwrap();
    assert!(doc.undo().unwrap());
    assert!(!doc.is_locked(0, 0));
}

#[test]
fn availability_flips_are_published() {
    init_tracing();
    let mut doc = table(0);
    let mut sub = doc.subscribe("undo.state");

    doc.edit_cell_at(0, 0, "x".into()).unwrap();
    doc.edit_cell_at(0, 0, "y".into()).unwrap();
    doc.undo().unwrap();
    doc.undo().unwrap();

    assert_eq!(
        sub.drain(),
        vec![
            TableFlow::UndoStateChanged { can_undo: true, can_redo: false },
            TableFlow::UndoStateChanged { can_undo: true, can_redo: true },
            TableFlow::UndoStateChanged { can_undo: false, can_redo: true },
        ]
    );
}
