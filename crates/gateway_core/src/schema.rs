//! Virtual relational schema built from backend metadata.
//!
//! A [`Schema`] is a named virtual database backed by one backend type. Its
//! tables are discovered lazily and cached for the life of the process, see
//! [`crate::discovery`].
use crate::result::{ColumnHeader, ResultSet, Row};
use crate::types::{ScalarValue, ValueType};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

/// A column projection of a backend field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Dot separated path for nested fields, e.g. `address.city`.
    pub name: String,
    pub value_type: ValueType,
    /// Declared display width.
    pub length: u32,
    /// Raw backend type descriptor.
    pub description: String,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        length: u32,
        description: impl Into<String>,
    ) -> Self {
        Field {
            name: name.into(),
            value_type,
            length,
            description: description.into(),
        }
    }
}

/// One row of DESCRIBE output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeRow {
    pub field: String,
    /// Backend-native type string.
    pub native_type: String,
    pub nullable: bool,
    /// Key marker, `PRI` for the identifier column.
    pub key: String,
    pub default: Option<String>,
    /// Raw mapping text or other notes.
    pub extra: String,
}

impl DescribeRow {
    pub fn nullable(
        field: impl Into<String>,
        native_type: impl Into<String>,
        extra: impl Into<String>,
    ) -> Self {
        DescribeRow {
            field: field.into(),
            native_type: native_type.into(),
            nullable: true,
            key: String::new(),
            default: None,
            extra: extra.into(),
        }
    }
}

/// Column labels of DESCRIBE output.
pub const DESCRIBE_COLUMNS: [&str; 6] = ["Field", "Type", "Null", "Key", "Default", "Extra"];

/// Relational projection of a single backend collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    /// Name of the owning schema, resolved through the schema registry.
    pub schema: String,
    fields: Vec<Field>,
    describe_rows: Vec<DescribeRow>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            schema: schema.into(),
            fields: Vec::new(),
            describe_rows: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn add_describe_row(&mut self, row: DescribeRow) {
        self.describe_rows.push(row);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn describe_rows(&self) -> &[DescribeRow] {
        &self.describe_rows
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column headers for every field, in stored order.
    pub fn column_headers(&self) -> Vec<ColumnHeader> {
        self.fields
            .iter()
            .map(|f| self.column_header(f, &f.name))
            .collect()
    }

    pub fn column_header(&self, field: &Field, label: &str) -> ColumnHeader {
        ColumnHeader::new(label, field.value_type, field.length)
            .with_source(self.schema.clone(), self.name.clone())
    }

    /// Result set answering `DESCRIBE <table>`.
    pub fn describe_result_set(&self) -> ResultSet {
        let columns = DESCRIBE_COLUMNS
            .iter()
            .map(|name| ColumnHeader::new(*name, ValueType::String, 256))
            .collect();

        let rows: Vec<Row> = self
            .describe_rows
            .iter()
            .map(|r| {
                vec![
                    ScalarValue::from(r.field.as_str()),
                    ScalarValue::from(r.native_type.as_str()),
                    ScalarValue::from(if r.nullable { "YES" } else { "NO" }),
                    ScalarValue::from(r.key.as_str()),
                    r.default
                        .as_deref()
                        .map(ScalarValue::from)
                        .unwrap_or(ScalarValue::Null),
                    ScalarValue::from(r.extra.as_str()),
                ]
            })
            .collect();

        ResultSet::from_rows(columns, rows)
    }
}

/// Cache of discovered tables, keyed by table name.
///
/// Each key gets its own once-cell so concurrent first lookups for the same
/// table wait on a single backend fetch instead of racing.
#[derive(Debug, Default)]
pub struct TableCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<Table>>>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table if it's already been built.
    pub fn get(&self, name: &str) -> Option<Arc<Table>> {
        let entries = self.entries.lock();
        entries.get(name).and_then(|cell| cell.get().cloned())
    }

    /// Returns the slot for a table, creating an empty one if needed.
    pub(crate) fn slot(&self, name: &str) -> Arc<OnceCell<Arc<Table>>> {
        let mut entries = self.entries.lock();
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drop a slot left empty by a failed build.
    ///
    /// Only removes the entry if it's still `slot`, a concurrent lookup may
    /// have replaced it already.
    pub(crate) fn remove_empty(&self, name: &str, slot: &Arc<OnceCell<Arc<Table>>>) {
        let mut entries = self.entries.lock();
        let stale = entries
            .get(name)
            .is_some_and(|cell| Arc::ptr_eq(cell, slot) && !cell.initialized());
        if stale {
            entries.remove(name);
        }
    }

    /// Number of slots, built or pending.
    pub fn slot_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Names of the tables that have been built so far.
    pub fn cached_names(&self) -> Vec<String> {
        let entries = self.entries.lock();
        let mut names: Vec<_> = entries
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// A named virtual database mapped onto one backend.
#[derive(Debug)]
pub struct Schema {
    pub name: String,
    /// Backend-type tag, e.g. `elasticsearch`.
    pub backend_type: String,
    /// Addresses of the nodes serving this schema.
    addresses: Vec<String>,
    next_backend: AtomicUsize,
    table_names: RwLock<Vec<String>>,
    tables: TableCache,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        backend_type: impl Into<String>,
        addresses: Vec<String>,
    ) -> Self {
        Schema {
            name: name.into(),
            backend_type: backend_type.into(),
            addresses,
            next_backend: AtomicUsize::new(0),
            table_names: RwLock::new(Vec::new()),
            tables: TableCache::new(),
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Pick a backend address, round robin across configured nodes.
    ///
    /// Always the same address with a single node. `None` if no nodes are
    /// configured.
    pub fn choose_backend(&self) -> Option<&str> {
        match self.addresses.len() {
            0 => None,
            1 => Some(self.addresses[0].as_str()),
            n => {
                let idx = self.next_backend.fetch_add(1, Ordering::Relaxed) % n;
                Some(self.addresses[idx].as_str())
            }
        }
    }

    /// Known table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.table_names.read().clone()
    }

    pub fn set_table_names(&self, mut names: Vec<String>) {
        names.sort();
        names.dedup();
        *self.table_names.write() = names;
    }

    pub fn tables(&self) -> &TableCache {
        &self.tables
    }
}
