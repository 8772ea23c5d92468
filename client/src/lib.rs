pub use crate::responses::*;

pub mod backoff;
pub mod config;
pub mod http;
pub mod responses;
pub mod scan;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Reqwest error: {0}")]
    Reqwest(reqwest::Error),
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Elasticsearch error (status {status}): {reason}")]
    Api { status: u16, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Connection failures and timeouts, which are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Reqwest(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[macro_export]
macro_rules! scan_log {
    ($level:ident, $module:expr, $index:expr, $msg:expr $(, $args:expr)* ) => {
        tracing::$level!(
            "[{}][{}] {}", $module, $index, format!($msg $(, $args)*)
        );
    }
}
