use std::io;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Parse(#[from] sqlparser::parser::ParserError),

    #[error("Query was empty")]
    EmptyQuery,

    #[error("{0}")]
    UnsupportedStatement(String),

    #[error("command {tag}:{name} not supported for now", name = command_label(.tag))]
    UnsupportedCommand { tag: u8 },

    #[error("Unknown database '{0}'")]
    SchemaNotFound(String),

    #[error("No database selected")]
    NoActiveSchema,

    #[error("Could not resolve schema for table '{table}': {cause}")]
    SchemaResolution { table: String, cause: BoxedError },

    #[error("{0}")]
    Translation(String),

    #[error("Backend query failed: {0}")]
    BackendQuery(BoxedError),

    #[error("handle query {sql} error {message}")]
    InternalFault { sql: String, message: String },

    #[error("duplicate schema '{0}'")]
    DuplicateSchema(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn command_label(tag: &u8) -> &'static str {
    crate::connection::command_name(*tag)
}

impl GatewayError {
    pub fn schema_resolution(table: impl Into<String>, cause: impl Into<BoxedError>) -> Self {
        GatewayError::SchemaResolution {
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn backend_query(cause: impl Into<BoxedError>) -> Self {
        GatewayError::BackendQuery(cause.into())
    }

    /// MySQL error code reported to the client.
    pub fn error_code(&self) -> u16 {
        match self {
            Self::Parse(_) => 1064,
            Self::EmptyQuery => 1065,
            Self::UnsupportedStatement(_) => 1235,
            Self::UnsupportedCommand { .. } => 1047,
            Self::SchemaNotFound(_) => 1049,
            Self::NoActiveSchema => 1046,
            Self::SchemaResolution { .. } => 1146,
            _ => 1105,
        }
    }

    /// Five character SQL state reported alongside the error code.
    pub fn sql_state(&self) -> &'static str {
        match self {
            Self::Parse(_)
            | Self::EmptyQuery
            | Self::UnsupportedStatement(_)
            | Self::SchemaNotFound(_) => "42000",
            Self::UnsupportedCommand { .. } => "08S01",
            Self::NoActiveSchema => "3D000",
            Self::SchemaResolution { .. } => "42S02",
            _ => "HY000",
        }
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

macro_rules! internal {
    ($($arg:tt)*) => {
        crate::errors::GatewayError::Internal(std::format!($($arg)*))
    };
}
pub(crate) use internal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_command_message() {
        let err = GatewayError::UnsupportedCommand { tag: 0x04 };
        assert_eq!(
            "command 4:COM_FIELD_LIST not supported for now",
            err.to_string()
        );
        assert_eq!(1047, err.error_code());
    }

    #[test]
    fn no_database_selected() {
        let err = GatewayError::NoActiveSchema;
        assert_eq!(1046, err.error_code());
        assert_eq!("3D000", err.sql_state());
        assert_eq!("No database selected", err.to_string());
    }
}
