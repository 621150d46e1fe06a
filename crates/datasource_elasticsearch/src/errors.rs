use gateway_core::errors::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ElasticsearchError {
    #[error("Unexpected response from {url}, status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid node address '{0}'")]
    InvalidAddress(String),

    #[error("{0}")]
    Translation(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl From<ElasticsearchError> for GatewayError {
    fn from(value: ElasticsearchError) -> Self {
        match value {
            ElasticsearchError::Translation(msg) => GatewayError::Translation(msg),
            other => GatewayError::backend_query(other),
        }
    }
}

pub type Result<T, E = ElasticsearchError> = std::result::Result<T, E>;
