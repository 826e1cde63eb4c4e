//! Schema versioning and migration from the legacy positional layout.
//!
//! Version 1 documents address everything by position:
//!
//! ```text
//! ROOT
//! ├── table_headers (List<Str>)     # header strings, left → right
//! ├── table_data (List<Map>)        # one map per row, keyed by header string
//! └── column_widths (Map)           # header string → F64, optional
//! ```
//!
//! [`ensure_current_schema`] rewrites that into the identity layout described
//! in [`crate::store`] in a single commit and stamps `meta.schema_version`.
//! Legacy containers are left as they are.

use std::collections::HashSet;

use indexmap::IndexMap;
use loro::{LoroDoc, LoroList, LoroMap, LoroValue};

use tabula_types::{CellValue, ColumnId, RowId, now_millis};

use crate::config::TableConfig;
use crate::document::Origin;
use crate::store::{
    META, TableStore, cell_from_loro, cell_key, cell_to_loro, loro_f64, loro_i64, loro_str,
    map_value, raw_entries,
};
use crate::{Result, TableError};

/// Layout version written by this build.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Version implied by a document with no `schema_version` stamp.
pub const LEGACY_SCHEMA_VERSION: i64 = 1;

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";
const MIGRATED_BY_KEY: &str = "migrated_by";
const MIGRATED_AT_KEY: &str = "migrated_at";

const LEGACY_HEADERS: &str = "table_headers";
const LEGACY_DATA: &str = "table_data";
const LEGACY_WIDTHS: &str = "column_widths";

/// What [`ensure_current_schema`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The document was already at the current version. Nothing was written.
    AlreadyCurrent,
    /// The legacy layout was converted.
    Migrated {
        from_version: i64,
        columns: usize,
        rows: usize,
    },
}

/// Read the stamped schema version, if any.
pub fn schema_version(doc: &LoroDoc) -> Option<i64> {
    map_value(&doc.get_map(META), SCHEMA_VERSION_KEY).and_then(|v| loro_i64(&v))
}

/// Bring a document to [`CURRENT_SCHEMA_VERSION`].
///
/// Idempotent and safe to call on every open by every replica. A current
/// document returns [`MigrationOutcome::AlreadyCurrent`] without committing.
/// A document stamped with a newer version fails with
/// [`TableError::SchemaTooNew`] and is left untouched.
///
/// Migration mints ids with [`ColumnId::derived`] and [`RowId::derived`], so
/// two replicas migrating the same legacy document concurrently write
/// identical ids and values. Every definition and cell is a plain value under
/// a root map, so the two migrations collide on values rather than on nested
/// containers, and an edit made after either migration outranks both. Their
/// order entries may still both land; reads hide the repeat and the next
/// structural edit compacts it.
pub fn ensure_current_schema(
    doc: &LoroDoc,
    document_id: &str,
    config: &TableConfig,
) -> Result<MigrationOutcome> {
    let found = schema_version(doc).unwrap_or(LEGACY_SCHEMA_VERSION);
    if found > CURRENT_SCHEMA_VERSION {
        tracing::error!(
            document_id,
            found,
            supported = CURRENT_SCHEMA_VERSION,
            "refusing to open document with newer schema"
        );
        return Err(TableError::SchemaTooNew {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(MigrationOutcome::AlreadyCurrent);
    }

    let legacy = LegacyTable::read(doc)?;
    let store = TableStore::new(doc.clone());
    let result = write_current_layout(&store, &legacy, document_id, config);

    doc.set_next_commit_origin(Origin::Migrate.as_str());
    doc.commit();

    let (columns, rows) = result.inspect_err(|e| {
        tracing::error!(document_id, error = %e, "schema migration failed");
    })?;

    tracing::info!(
        document_id,
        from_version = found,
        to_version = CURRENT_SCHEMA_VERSION,
        columns,
        rows,
        "migrated table document"
    );
    Ok(MigrationOutcome::Migrated {
        from_version: found,
        columns,
        rows,
    })
}

fn write_current_layout(
    store: &TableStore,
    legacy: &LegacyTable,
    document_id: &str,
    config: &TableConfig,
) -> Result<(usize, usize)> {
    let names = store.columns();
    let widths = store.widths();
    let rows = store.rows();
    let cells = store.cells();
    let column_order = store.column_order();
    let row_order = store.row_order();

    // Keys already present: a racing migration from this replica's past.
    let mut placed_columns: HashSet<String> = raw_entries(&column_order)
        .into_iter()
        .flatten()
        .collect();
    let mut placed_rows: HashSet<String> = raw_entries(&row_order)
        .into_iter()
        .flatten()
        .collect();

    let mut header_ids: Vec<(String, ColumnId)> = Vec::with_capacity(legacy.headers.len());
    for (position, header) in legacy.headers.iter().enumerate() {
        let id = ColumnId::derived(document_id, position, header);
        let key = id.to_key();
        let width = legacy
            .widths
            .get(header)
            .copied()
            .unwrap_or(config.default_column_width);

        names.insert(&key, header.as_str())?;
        widths.insert(&key, width)?;
        if placed_columns.insert(key.clone()) {
            column_order.push(key.as_str())?;
        }
        header_ids.push((header.clone(), id));
    }

    for (position, legacy_row) in legacy.rows.iter().enumerate() {
        let id = RowId::derived(document_id, position);
        let key = id.to_key();
        rows.insert(&key, true)?;
        for (header, col) in &header_ids {
            let value = legacy_row.get(header).cloned().unwrap_or_else(CellValue::empty);
            cells.insert(&cell_key(&id, col), cell_to_loro(&value))?;
        }
        if placed_rows.insert(key.clone()) {
            row_order.push(key.as_str())?;
        }
    }

    let meta = store.meta();
    meta.insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION)?;
    meta.insert(MIGRATED_BY_KEY, store.doc().peer_id().to_string().as_str())?;
    meta.insert(MIGRATED_AT_KEY, now_millis() as i64)?;

    Ok((header_ids.len(), legacy.rows.len()))
}

// ============================================================================
// Legacy layout
// ============================================================================

/// The version 1 positional table.
///
/// Readable from a document and writable into one, which is how fixtures for
/// migration tests are built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyTable {
    /// Distinct headers in header order.
    pub headers: Vec<String>,
    /// One map per row, keyed by header string.
    pub rows: Vec<IndexMap<String, CellValue>>,
    /// Recorded widths by header string.
    pub widths: IndexMap<String, f64>,
}

impl LegacyTable {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Append a row given as `(header, value)` pairs.
    pub fn with_row<K: Into<String>, V: Into<CellValue>>(
        mut self,
        cells: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.rows
            .push(cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn with_width(mut self, header: impl Into<String>, width: f64) -> Self {
        self.widths.insert(header.into(), width);
        self
    }

    /// Read the legacy containers. Missing containers read as empty.
    ///
    /// Repeated headers keep their first occurrence.
    pub fn read(doc: &LoroDoc) -> Result<Self> {
        let mut seen = HashSet::new();
        let headers: Vec<String> = list_items(&doc.get_list(LEGACY_HEADERS))
            .iter()
            .filter_map(loro_str)
            .filter(|h| seen.insert(h.clone()))
            .collect();

        let mut rows = Vec::new();
        for (position, item) in list_items(&doc.get_list(LEGACY_DATA)).iter().enumerate() {
            let LoroValue::Map(entries) = item else {
                return Err(TableError::MalformedLayout(format!(
                    "legacy row {position} is not a map"
                )));
            };
            let row: IndexMap<String, CellValue> = entries
                .iter()
                .filter_map(|(k, v)| {
                    cell_from_loro(v).map(|cell| (k.to_string(), cell))
                })
                .collect();
            rows.push(row);
        }

        let mut widths = IndexMap::new();
        if let LoroValue::Map(entries) = doc.get_map(LEGACY_WIDTHS).get_value() {
            for (header, value) in entries.iter() {
                if let Some(width) = loro_f64(value) {
                    widths.insert(header.to_string(), width);
                }
            }
        }

        Ok(Self {
            headers,
            rows,
            widths,
        })
    }

    /// Write this table into `doc` in the legacy layout and commit.
    pub fn write_into(&self, doc: &LoroDoc) -> Result<()> {
        let headers = doc.get_list(LEGACY_HEADERS);
        for header in &self.headers {
            headers.push(header.as_str())?;
        }

        let data = doc.get_list(LEGACY_DATA);
        for row in &self.rows {
            let row_map = data.insert_container(data.len(), LoroMap::new())?;
            for (header, value) in row {
                row_map.insert(header, cell_to_loro(value))?;
            }
        }

        let widths = doc.get_map(LEGACY_WIDTHS);
        for (header, width) in &self.widths {
            widths.insert(header, *width)?;
        }

        doc.get_map(META)
            .insert(SCHEMA_VERSION_KEY, LEGACY_SCHEMA_VERSION)?;
        doc.commit();
        Ok(())
    }
}

fn list_items(list: &LoroList) -> Vec<LoroValue> {
    match list.get_deep_value() {
        LoroValue::List(items) => items.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::COLUMNS;

    fn has_columns(doc: &LoroDoc) -> bool {
        !doc.get_map(COLUMNS).is_empty()
    }

    fn name_age() -> LegacyTable {
        LegacyTable::new(["Name", "Age"])
            .with_row([("Name", CellValue::from("Alice")), ("Age", CellValue::from(30.0))])
            .with_row([("Name", CellValue::from("Bob"))])
            .with_width("Name", 200.0)
    }

    fn legacy_doc(table: &LegacyTable) -> LoroDoc {
        let doc = LoroDoc::new();
        table.write_into(&doc).unwrap();
        doc
    }

    #[test]
    fn test_fresh_document_migrates_to_empty_table() {
        let doc = LoroDoc::new();
        let outcome = ensure_current_schema(&doc, "doc-1", &TableConfig::default()).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                from_version: 1,
                columns: 0,
                rows: 0
            }
        );
        assert_eq!(schema_version(&doc), Some(CURRENT_SCHEMA_VERSION));
        assert!(!has_columns(&doc));
    }

    #[test]
    fn test_name_age_migration() {
        let doc = legacy_doc(&name_age());
        ensure_current_schema(&doc, "doc-1", &TableConfig::default()).unwrap();

        let store = TableStore::new(doc.clone());
        let columns = store.columns_in_order();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "Name");
        assert_eq!(columns[0].width, 200.0);
        assert_eq!(columns[1].name, "Age");
        assert_eq!(columns[1].width, 150.0);

        let rows = store.rows_in_order();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Name"), Some(&CellValue::from("Alice")));
        assert_eq!(rows[0].get("Age"), Some(&CellValue::Number(30.0)));
        assert_eq!(rows[1].get("Name"), Some(&CellValue::from("Bob")));

        // Missing legacy cells are stored explicitly as empty text.
        let bob = rows[1].id;
        assert_eq!(
            store.cell_value(&bob, &columns[1].id),
            Some(CellValue::from(""))
        );
    }

    #[test]
    fn test_migration_is_idempotent() {
        let doc = legacy_doc(&name_age());
        let config = TableConfig::default();
        ensure_current_schema(&doc, "doc-1", &config).unwrap();
        let before = doc.oplog_vv();

        let outcome = ensure_current_schema(&doc, "doc-1", &config).unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyCurrent);
        assert_eq!(doc.oplog_vv(), before);
    }

    #[test]
    fn test_migration_ids_are_deterministic() {
        let table = name_age();
        let a = legacy_doc(&table);
        let b = legacy_doc(&table);
        let config = TableConfig::default();
        ensure_current_schema(&a, "doc-1", &config).unwrap();
        ensure_current_schema(&b, "doc-1", &config).unwrap();

        let ids_a = TableStore::new(a).column_ids();
        let ids_b = TableStore::new(b).column_ids();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_duplicate_headers_keep_first() {
        let table = LegacyTable::new(["Name", "Name", "Age"])
            .with_row([("Name", CellValue::from("Alice"))]);
        let doc = legacy_doc(&table);
        ensure_current_schema(&doc, "doc-1", &TableConfig::default()).unwrap();

        let store = TableStore::new(doc);
        let names: Vec<String> = store.columns_in_order().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Name", "Age"]);
    }

    #[test]
    fn test_future_schema_fails_closed() {
        let doc = LoroDoc::new();
        doc.get_map(META)
            .insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        doc.commit();

        let err = ensure_current_schema(&doc, "doc-1", &TableConfig::default()).unwrap_err();
        assert!(matches!(err, TableError::SchemaTooNew { found: 3, supported: 2 }));
        assert!(!has_columns(&doc));
    }

    #[test]
    fn test_legacy_containers_untouched() {
        let table = name_age();
        let doc = legacy_doc(&table);
        ensure_current_schema(&doc, "doc-1", &TableConfig::default()).unwrap();
        assert_eq!(LegacyTable::read(&doc).unwrap(), table);
    }
}
