//! Per-connection command dispatch.
use crate::backend::Backend;
use crate::classify::{
    ClassifiedStatement, SelectStatement, ShowKind, ShowStatement, SysVar, classify,
};
use crate::connection::{
    COM_INIT_DB, COM_PING, COM_QUERY, COM_QUIT, COM_STMT_PREPARE, Connection,
    SERVER_STATUS_AUTOCOMMIT, command_name,
};
use crate::discovery::resolve_table;
use crate::engine::Backends;
use crate::errors::{GatewayError, Result, internal};
use crate::materialize::Materializer;
use crate::parser::{is_session_setup, parse_sql};
use crate::registry::SchemaRegistry;
use crate::result::{ColumnHeader, ResultSet};
use crate::schema::{Schema, Table};
use crate::types::{ScalarValue, ValueType};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

/// Value reported for system variables we know nothing about.
const DEFAULT_SYS_VAR_VALUE: i64 = 1024 * 1024;

/// Lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingCommand,
    ProcessingQuery,
    Closed,
}

/// Result of executing a single query.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Statement handled, nothing to return.
    Ok,
    ResultSet(ResultSet),
}

/// What a command asks the connection to do next.
#[derive(Debug)]
pub enum CommandOutcome {
    Ok,
    ResultSet(ResultSet),
    Error(GatewayError),
    Quit,
}

impl From<Result<ExecutionResult>> for CommandOutcome {
    fn from(value: Result<ExecutionResult>) -> Self {
        match value {
            Ok(ExecutionResult::Ok) => CommandOutcome::Ok,
            Ok(ExecutionResult::ResultSet(rs)) => CommandOutcome::ResultSet(rs),
            Err(e) => CommandOutcome::Error(e),
        }
    }
}

/// Per-connection query state.
///
/// Holds the active schema by name. Tables are looked up through the shared
/// registry on every query.
#[derive(Debug)]
pub struct Session {
    registry: Arc<SchemaRegistry>,
    backends: Arc<Backends>,
    active_schema: Option<String>,
    recover_faults: bool,
    state: SessionState,
}

impl Session {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        backends: Arc<Backends>,
        active_schema: Option<String>,
        recover_faults: bool,
    ) -> Self {
        Session {
            registry,
            backends,
            active_schema,
            recover_faults,
            state: SessionState::AwaitingCommand,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_schema(&self) -> Option<&str> {
        self.active_schema.as_deref()
    }

    /// Handle one command packet.
    pub async fn handle_command(&mut self, tag: u8, payload: &[u8]) -> CommandOutcome {
        if self.state == SessionState::Closed {
            return CommandOutcome::Quit;
        }
        trace!(tag, command = command_name(tag), "handling command");

        match tag {
            COM_QUERY | COM_STMT_PREPARE => {
                let sql = String::from_utf8_lossy(payload).into_owned();
                self.state = SessionState::ProcessingQuery;
                let outcome: CommandOutcome = self.run_query(&sql).await.into();
                self.state = SessionState::AwaitingCommand;
                outcome
            }
            COM_PING => CommandOutcome::Ok,
            COM_INIT_DB => {
                let name = String::from_utf8_lossy(payload);
                match self.use_schema(name.trim().trim_matches('`')) {
                    Ok(()) => CommandOutcome::Ok,
                    Err(e) => CommandOutcome::Error(e),
                }
            }
            COM_QUIT => {
                self.state = SessionState::Closed;
                CommandOutcome::Quit
            }
            other => CommandOutcome::Error(GatewayError::UnsupportedCommand { tag: other }),
        }
    }

    /// Run a query inside the fault boundary.
    pub async fn run_query(&mut self, sql: &str) -> Result<ExecutionResult> {
        let span = debug_span!("query", %sql);
        if !self.recover_faults {
            return self.execute(sql).instrument(span).await;
        }

        match AssertUnwindSafe(self.execute(sql).instrument(span))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%sql, %message, "recovered from panic while handling query");
                Err(GatewayError::InternalFault {
                    sql: sql.to_string(),
                    message,
                })
            }
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecutionResult> {
        let stmt = match parse_sql(sql) {
            Ok(stmt) => stmt,
            Err(e) if is_session_setup(sql) => {
                debug!(%e, "acknowledging unparsed session setup");
                return Ok(ExecutionResult::Ok);
            }
            Err(e) => return Err(e),
        };

        match classify(&stmt) {
            ClassifiedStatement::Select(select) => self.select(select).await,
            ClassifiedStatement::Describe { schema, table } => {
                let table = self.table(schema.as_deref(), &table).await?;
                Ok(ExecutionResult::ResultSet(table.describe_result_set()))
            }
            ClassifiedStatement::Show(show) => self.show(show).await,
            ClassifiedStatement::SysVarSelect { variables } => {
                Ok(ExecutionResult::ResultSet(sys_var_result(&variables)))
            }
            ClassifiedStatement::Use { schema } => {
                self.use_schema(&schema)?;
                Ok(ExecutionResult::Ok)
            }
            ClassifiedStatement::Unsupported(reason) => {
                if is_session_setup(sql) {
                    debug!("acknowledging session setup");
                    return Ok(ExecutionResult::Ok);
                }
                Err(GatewayError::UnsupportedStatement(reason))
            }
        }
    }

    /// Switch the active schema.
    pub fn use_schema(&mut self, name: &str) -> Result<()> {
        let schema = self
            .registry
            .get(name)
            .ok_or_else(|| GatewayError::SchemaNotFound(name.to_string()))?;
        info!(schema = %schema.name, "using schema");
        self.active_schema = Some(schema.name.clone());
        Ok(())
    }

    /// Resolve an explicitly named schema, falling back to the active one.
    fn schema(&self, explicit: Option<&str>) -> Result<Arc<Schema>> {
        let name = match explicit {
            Some(name) => name,
            None => self
                .active_schema
                .as_deref()
                .ok_or(GatewayError::NoActiveSchema)?,
        };
        self.registry
            .get(name)
            .ok_or_else(|| GatewayError::SchemaNotFound(name.to_string()))
    }

    fn backend(&self, schema: &Schema) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(&schema.backend_type)
            .cloned()
            .ok_or_else(|| {
                internal!(
                    "no backend registered for type '{}' used by schema '{}'",
                    schema.backend_type,
                    schema.name
                )
            })
    }

    async fn table(&self, schema: Option<&str>, table: &str) -> Result<Arc<Table>> {
        let schema = self.schema(schema)?;
        let backend = self.backend(&schema)?;
        resolve_table(&schema, backend.as_ref(), table).await
    }

    async fn select(&self, select: SelectStatement) -> Result<ExecutionResult> {
        let schema = self.schema(select.schema.as_deref())?;
        let backend = self.backend(&schema)?;
        let table = resolve_table(&schema, backend.as_ref(), &select.table).await?;

        let request = backend.translate(&table, &select)?;
        trace!(table = %request.table, body = %request.body, "translated select");

        let address = schema.choose_backend().ok_or_else(|| {
            GatewayError::backend_query(format!("schema '{}' has no backend nodes", schema.name))
        })?;
        let response = backend.execute(address, &request).await?;
        debug!(
            records = response.records.len(),
            total = ?response.total,
            "backend query complete"
        );

        let materializer = Materializer::new(&table, &select.projection, response)?;
        Ok(ExecutionResult::ResultSet(materializer.into_result_set()))
    }

    async fn show(&self, show: ShowStatement) -> Result<ExecutionResult> {
        match show.kind {
            ShowKind::Databases => Ok(ExecutionResult::ResultSet(ResultSet::from_values(
                "Database",
                self.registry.names(),
            ))),
            ShowKind::Tables => {
                let schema = self.schema(show.from.as_deref())?;
                let names = self.table_names(&schema).await?;
                if names.is_empty() {
                    return Err(GatewayError::backend_query(format!(
                        "No tables found in schema '{}'",
                        schema.name
                    )));
                }
                Ok(ExecutionResult::ResultSet(ResultSet::from_values(
                    format!("Tables_in_{}", schema.name),
                    names,
                )))
            }
            ShowKind::Unsupported(text) => Err(GatewayError::UnsupportedStatement(format!(
                "statement not supported now: {text}"
            ))),
        }
    }

    /// Table names for a schema, listing from the backend if none are known
    /// yet.
    async fn table_names(&self, schema: &Schema) -> Result<Vec<String>> {
        let names = schema.table_names();
        if !names.is_empty() {
            return Ok(names);
        }

        let backend = self.backend(schema)?;
        let Some(address) = schema.choose_backend() else {
            warn!(schema = %schema.name, "schema has no backend nodes to list tables from");
            return Ok(Vec::new());
        };
        let listed = backend.list_tables(address).await?;
        schema.set_table_names(listed);
        Ok(schema.table_names())
    }
}

/// Single row answering a system variable select.
fn sys_var_result(variables: &[SysVar]) -> ResultSet {
    let mut columns = Vec::with_capacity(variables.len());
    let mut row = Vec::with_capacity(variables.len());
    for var in variables {
        let value = sys_var_value(&var.name);
        let (value_type, length) = match value {
            ScalarValue::Int(_) => (ValueType::Int, 8),
            _ => (ValueType::String, 512),
        };
        columns.push(ColumnHeader::new(&var.label, value_type, length));
        row.push(value);
    }
    ResultSet::from_rows(columns, vec![row])
}

fn sys_var_value(name: &str) -> ScalarValue {
    match name {
        "max_allowed_packet" => ScalarValue::Int(DEFAULT_SYS_VAR_VALUE),
        "version_comment" => ScalarValue::from("docgate"),
        "version" => ScalarValue::from(concat!("5.7.0-docgate-", env!("CARGO_PKG_VERSION"))),
        "autocommit" => ScalarValue::Int(1),
        "tx_isolation" | "transaction_isolation" => ScalarValue::from("REPEATABLE-READ"),
        other => {
            debug!(variable = %other, "unknown system variable, using default");
            ScalarValue::Int(DEFAULT_SYS_VAR_VALUE)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives a [`Session`] over a connection until the client quits.
pub struct ClientSession<C> {
    conn: C,
    session: Session,
}

impl<C: Connection> ClientSession<C> {
    pub fn new(session: Session, conn: C) -> Self {
        ClientSession { conn, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let (tag, payload) = match self.conn.read_command().await? {
                Some(cmd) => cmd,
                None => {
                    trace!("connection closed");
                    self.session.state = SessionState::Closed;
                    return Ok(());
                }
            };

            match self.session.handle_command(tag, &payload).await {
                CommandOutcome::Ok => self.conn.write_ok(None).await?,
                CommandOutcome::ResultSet(rs) => {
                    self.conn
                        .write_result_set(SERVER_STATUS_AUTOCOMMIT, rs)
                        .await?
                }
                CommandOutcome::Error(e) => self.send_error(e).await?,
                CommandOutcome::Quit => {
                    trace!("client quit");
                    self.conn.close().await?;
                    return Ok(());
                }
            }
        }
    }

    /// Send an error packet to the client.
    async fn send_error(&mut self, err: GatewayError) -> Result<()> {
        warn!(%err, code = err.error_code(), "command failed");
        self.conn
            .write_error(err.error_code(), err.sql_state(), &err.to_string())
            .await
    }
}
