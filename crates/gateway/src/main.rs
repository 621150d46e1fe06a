mod script;

use clap::Parser;
use datasource_elasticsearch::ElasticsearchBackend;
use gateway_core::backend::Backend;
use gateway_core::config::GatewayConfig;
use gateway_core::engine::Engine;
use gateway_core::errors::{GatewayError, Result};
use script::ScriptedConnection;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

#[derive(Parser)]
#[clap(name = "gateway")]
struct Arguments {
    /// Path to the gateway config file.
    #[clap(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Schema to use before running any queries.
    #[clap(short, long)]
    database: Option<String>,

    /// Default log level, overridden by RUST_LOG.
    #[clap(long, env = "GATEWAY_LOG_LEVEL", default_value = "warn")]
    log_level: tracing::Level,

    /// Output logs as json.
    #[clap(long)]
    log_json: bool,

    /// Execute file containing sql statements then exit.
    #[clap(short = 'f', long)]
    files: Vec<PathBuf>,

    /// Queries to execute.
    #[clap(trailing_var_arg = true)]
    queries: Vec<String>,
}

/// Run SQL against configured schemas and print the results.
fn main() {
    let args = Arguments::parse();
    logutil::configure_global_logger(
        args.log_level,
        logutil::LogFormat::from_json_flag(args.log_json),
        io::stderr,
    );

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(GatewayError::from)
        .and_then(|runtime| runtime.block_on(inner(args)));

    match result {
        Ok(0) => (),
        Ok(_) => std::process::exit(1),
        Err(err) => {
            eprintln!("ERROR: {err}");
            std::process::exit(1);
        }
    }
}

/// Returns the number of failed statements.
async fn inner(args: Arguments) -> Result<usize> {
    let config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => {
            info!("no config file given, using defaults");
            GatewayConfig::default()
        }
    };

    let es = ElasticsearchBackend::try_new(config.elasticsearch.max_rows)?;
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(es)];
    let engine = Engine::try_new(&config, backends)?;
    engine.init().await;

    let mut conn = ScriptedConnection::new(BufWriter::new(io::stdout()));
    if let Some(db) = &args.database {
        conn.push_init_db(db);
    }
    for path in &args.files {
        let content = std::fs::read_to_string(path)?;
        for sql in split_statements(&content) {
            conn.push_query(sql);
        }
    }
    for sql in &args.queries {
        for sql in split_statements(sql) {
            conn.push_query(sql);
        }
    }

    let errors = conn.error_counter();
    engine
        .spawn_session(conn)
        .await
        .map_err(|e| GatewayError::Internal(format!("session task failed: {e}")))??;

    let errors = errors.load(Ordering::Relaxed);
    debug!(errors, "finished running queries");
    Ok(errors)
}

/// Split text into statements on semicolons outside of quotes.
fn split_statements(text: &str) -> Vec<&str> {
    let mut stmts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = text.char_indices();

    while let Some((idx, c)) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ';') => {
                stmts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => (),
        }
    }
    stmts.push(&text[start..]);

    stmts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
