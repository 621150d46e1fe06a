//! Relational results handed to a connection for serialization.
use crate::types::{ScalarValue, ValueType};
use std::fmt;

/// A positional row aligned to the column headers of its result set.
pub type Row = Vec<ScalarValue>;

/// Lazily produced rows. Finite and not restartable.
pub type RowIter = Box<dyn Iterator<Item = Row> + Send>;

/// Column metadata for a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    /// Label sent to the client (alias if one was given).
    pub name: String,
    /// Name of the source table, empty for computed results.
    pub table: String,
    /// Name of the schema the table belongs to.
    pub schema: String,
    pub value_type: ValueType,
    /// Declared display width.
    pub length: u32,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>, value_type: ValueType, length: u32) -> Self {
        ColumnHeader {
            name: name.into(),
            table: String::new(),
            schema: String::new(),
            value_type,
            length,
        }
    }

    pub fn with_source(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.table = table.into();
        self
    }
}

/// Headers plus a stream of rows.
pub struct ResultSet {
    pub columns: Vec<ColumnHeader>,
    pub rows: RowIter,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnHeader>, rows: RowIter) -> Self {
        ResultSet { columns, rows }
    }

    /// A result set backed by rows that are already in memory.
    pub fn from_rows(columns: Vec<ColumnHeader>, rows: Vec<Row>) -> Self {
        ResultSet {
            columns,
            rows: Box::new(rows.into_iter()),
        }
    }

    /// A single column result set, one row per value.
    pub fn from_values<I, V>(label: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        let rows: Vec<Row> = values.into_iter().map(|v| vec![v.into()]).collect();
        Self::from_rows(vec![ColumnHeader::new(label, ValueType::String, 512)], rows)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Drain all remaining rows.
    pub fn collect_rows(self) -> Vec<Row> {
        self.rows.collect()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Payload of an OK response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: u16,
    pub warnings: u16,
}
