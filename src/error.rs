use thiserror::Error;

/// Broker error types.
///
/// None of these ever reach the broker's callers as failures; they are logged,
/// handed to the configured error hook, and degrade delivery.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
