//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    HumanReadable,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::HumanReadable
        }
    }
}

/// Dependencies that are chatty at debug/trace and rarely useful.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
    ("sqlparser", "warn"),
];

/// Build the filter for the given default level.
///
/// `RUST_LOG` takes precedence when set.
pub fn env_filter(level: Level) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![level.to_string().to_lowercase()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{target}={lvl}"));
    }

    EnvFilter::try_new(directives.join(","))
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()))
}

/// Configure the global logger.
///
/// Calling this more than once is a no-op, the first subscriber wins.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = env_filter(default_level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = match format {
        LogFormat::HumanReadable => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    // Another subscriber already being set is fine (e.g. in tests).
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn json_flag() {
        assert_eq!(LogFormat::Json, LogFormat::from_json_flag(true));
        assert_eq!(LogFormat::HumanReadable, LogFormat::from_json_flag(false));
    }

    #[test]
    fn configure_twice_is_noop() {
        configure_global_logger(Level::INFO, LogFormat::HumanReadable, io::sink);
        configure_global_logger(Level::DEBUG, LogFormat::Json, io::sink);
    }
}
