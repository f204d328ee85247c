//! Error types for the proxy

use thiserror::Error;

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Main error type for the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric registration error
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Upstream HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
