//! Process-wide gateway state shared by every session.
use crate::backend::Backend;
use crate::config::GatewayConfig;
use crate::connection::Connection;
use crate::errors::{GatewayError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::Schema;
use crate::session::{ClientSession, Session};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

/// Backends keyed by their backend-type tag.
pub type Backends = HashMap<String, Arc<dyn Backend>>;

/// Shared schema registry and backends, handed out to sessions.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<SchemaRegistry>,
    backends: Arc<Backends>,
    default_schema: Option<String>,
    recover_faults: bool,
    next_conn_id: AtomicU64,
}

impl Engine {
    /// Create an engine from config and the available backends.
    ///
    /// Every schema's backend type must have a backend.
    pub fn try_new(config: &GatewayConfig, backends: Vec<Arc<dyn Backend>>) -> Result<Engine> {
        let backends: Backends = backends
            .into_iter()
            .map(|b| (b.backend_type().to_string(), b))
            .collect();

        let mut registry = SchemaRegistry::new();
        for schema in &config.schemas {
            if !backends.contains_key(&schema.backend_type) {
                return Err(GatewayError::Config(format!(
                    "schema '{}' uses unsupported backend type '{}'",
                    schema.name, schema.backend_type
                )));
            }
            let addresses = config.schema_addresses(schema);
            debug!(schema = %schema.name, ?addresses, "registering schema");
            registry.register(Schema::new(&schema.name, &schema.backend_type, addresses))?;
        }

        Ok(Engine {
            registry: Arc::new(registry),
            backends: Arc::new(backends),
            default_schema: config.default_schema.clone(),
            recover_faults: config.recover_faults,
            next_conn_id: AtomicU64::new(0),
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Fetch table listings for every schema.
    ///
    /// Failures are logged and leave the listing empty, it's fetched again on
    /// the next SHOW TABLES.
    pub async fn init(&self) {
        for schema in self.registry.schemas() {
            let Some(backend) = self.backends.get(&schema.backend_type) else {
                continue;
            };
            let Some(address) = schema.choose_backend() else {
                warn!(schema = %schema.name, "schema has no nodes, skipping table listing");
                continue;
            };
            match backend.list_tables(address).await {
                Ok(tables) => {
                    info!(schema = %schema.name, num_tables = tables.len(), "loaded table listing");
                    schema.set_table_names(tables);
                }
                Err(e) => {
                    warn!(schema = %schema.name, %address, %e, "failed to list tables");
                }
            }
        }
    }

    pub fn new_session(&self) -> Session {
        Session::new(
            self.registry.clone(),
            self.backends.clone(),
            self.default_schema.clone(),
            self.recover_faults,
        )
    }

    /// Serve a connection on its own task.
    pub fn spawn_session<C>(&self, conn: C) -> JoinHandle<Result<()>>
    where
        C: Connection + 'static,
    {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let session = ClientSession::new(self.new_session(), conn);
        let span = info_span!("session", conn_id);
        tokio::spawn(
            async move {
                debug!("session started");
                let result = session.run().await;
                if let Err(e) = &result {
                    warn!(%e, "session ended with error");
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryBackend, orders_metadata};

    fn config() -> GatewayConfig {
        GatewayConfig::from_toml_str(
            r#"
default_schema = "alpha"

[[schemas]]
name = "alpha"
backend_type = "memory"
nodes = ["m1"]

[[schemas]]
name = "empty"
backend_type = "memory"

[[nodes]]
name = "m1"
address = "mem://one"
"#,
        )
        .unwrap()
    }

    fn memory() -> Arc<dyn Backend> {
        Arc::new(MemoryBackend::new().with_table("orders", orders_metadata(), Vec::new()))
    }

    #[tokio::test]
    async fn init_loads_listing() {
        let engine = Engine::try_new(&config(), vec![memory()]).unwrap();
        engine.init().await;

        let alpha = engine.registry().get("alpha").unwrap();
        assert_eq!(vec!["orders"], alpha.table_names());
        assert_eq!(vec!["mem://one"], alpha.addresses());

        let empty = engine.registry().get("empty").unwrap();
        assert!(empty.table_names().is_empty());
    }

    #[tokio::test]
    async fn sessions_start_in_default_schema() {
        let engine = Engine::try_new(&config(), vec![memory()]).unwrap();
        let session = engine.new_session();
        assert_eq!(Some("alpha"), session.active_schema());
    }

    #[test]
    fn missing_backend_type() {
        let err = Engine::try_new(&config(), Vec::new()).unwrap_err();
        assert!(
            err.to_string().contains("unsupported backend type"),
            "{err}"
        );
    }
}
