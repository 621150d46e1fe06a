//! In-memory backend for tests.
use crate::backend::{Backend, BackendRequest, BackendResponse, NativeField, Record};
use crate::classify::{Projection, SelectStatement};
use crate::errors::{GatewayError, Result};
use crate::schema::Table;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryTable {
    fields: Vec<NativeField>,
    records: Vec<Record>,
}

/// Backend serving fixed tables from memory.
///
/// Counts metadata fetches so tests can check caching.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: BTreeMap<String, MemoryTable>,
    metadata_delay: Option<Duration>,
    metadata_calls: AtomicUsize,
    panic_on_execute: bool,
    requests: Mutex<Vec<BackendRequest>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(
        mut self,
        name: &str,
        fields: Vec<NativeField>,
        records: Vec<Record>,
    ) -> Self {
        self.tables
            .insert(name.to_string(), MemoryTable { fields, records });
        self
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    pub fn with_panic_on_execute(mut self) -> Self {
        self.panic_on_execute = true;
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Requests received by `execute`, oldest first.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn backend_type(&self) -> &str {
        "memory"
    }

    async fn list_tables(&self, _address: &str) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn table_metadata(&self, _address: &str, table: &str) -> Result<Vec<NativeField>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        self.tables
            .get(table)
            .map(|t| t.fields.clone())
            .ok_or_else(|| GatewayError::backend_query(format!("no such index: {table}")))
    }

    fn translate(&self, table: &Table, select: &SelectStatement) -> Result<BackendRequest> {
        if select.predicate.is_some() {
            return Err(GatewayError::Translation(
                "memory backend doesn't support predicates".to_string(),
            ));
        }
        if let Projection::Columns(columns) = &select.projection {
            for column in columns {
                if table.field_by_name(&column.name).is_none() {
                    return Err(GatewayError::Translation(format!(
                        "Unknown column '{}'",
                        column.name
                    )));
                }
            }
        }
        Ok(BackendRequest {
            table: table.name.clone(),
            body: serde_json::json!({ "limit": select.limit, "offset": select.offset }),
        })
    }

    async fn execute(&self, _address: &str, request: &BackendRequest) -> Result<BackendResponse> {
        if self.panic_on_execute {
            panic!("memory backend exploded");
        }
        self.requests.lock().push(request.clone());

        let mut records = self
            .tables
            .get(&request.table)
            .map(|t| t.records.clone())
            .unwrap_or_default();
        for record in &mut records {
            record.kind.get_or_insert_with(|| request.table.clone());
        }
        let offset = request.body["offset"].as_u64().unwrap_or(0) as usize;
        let limit = request.body["limit"].as_u64().map(|l| l as usize);
        let total = records.len() as u64;
        let records: Vec<_> = records
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(BackendResponse {
            records,
            total: Some(total),
        })
    }
}

/// The `orders` index: `id` (long) and `customer` with a `name` text field.
pub fn orders_metadata() -> Vec<NativeField> {
    vec![
        NativeField::scalar("id", "long"),
        NativeField::object("customer", vec![NativeField::scalar("name", "text")]),
    ]
}

/// Build a record from a JSON object literal.
pub fn record(doc: serde_json::Value, score: Option<f64>) -> Record {
    match doc {
        serde_json::Value::Object(fields) => Record {
            fields,
            score,
            ..Default::default()
        },
        other => panic!("record must be an object: {other}"),
    }
}
