use thiserror::Error;

/// Transport and protocol errors talking to the Prometheus HTTP API
#[derive(Error, Debug)]
pub enum PrometheusError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Query failed ({error_type}): {message}")]
    Query { error_type: String, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Prometheus configuration error: {0}")]
    Config(String),
}

/// Why a single metric's cardinality could not be determined
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("No data for metric {name}")]
    NoData { name: String },

    #[error("Malformed response for metric {name}: {reason}")]
    MalformedResponse { name: String, reason: String },

    #[error("Backend error for metric {name}: {source}")]
    Backend {
        name: String,
        #[source]
        source: PrometheusError,
    },
}

impl LookupError {
    pub fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoData { .. } => "no_data",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Backend { .. } => "backend",
        }
    }
}
