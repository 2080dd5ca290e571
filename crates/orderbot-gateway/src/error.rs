//! Error types for the Gateway

use orderbot_core::MenuLoadError;
use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Menu source error: {0}")]
    MenuSource(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

impl From<csv::Error> for GatewayError {
    fn from(e: csv::Error) -> Self {
        GatewayError::MenuSource(e.to_string())
    }
}

impl From<MenuLoadError> for GatewayError {
    fn from(e: MenuLoadError) -> Self {
        GatewayError::MenuSource(e.to_string())
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
