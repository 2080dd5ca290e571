//! Error types for the order engine

use thiserror::Error;

/// Reasons a menu document could not be turned into a [`crate::Menu`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MenuLoadError {
    #[error("Menu source unreadable: {0}")]
    Io(String),

    #[error("Malformed menu document: {0}")]
    Malformed(String),

    #[error("Menu mixes flat prices and sections at the top level")]
    MixedShape,

    #[error("Negative price for '{item}' in section '{section}'")]
    NegativePrice { section: String, item: String },

    #[error("Invalid price for '{item}' in section '{section}'")]
    InvalidPrice { section: String, item: String },

    #[error("Duplicate item '{item}' in section '{section}'")]
    DuplicateItem { section: String, item: String },
}

impl From<serde_json::Error> for MenuLoadError {
    fn from(e: serde_json::Error) -> Self {
        MenuLoadError::Malformed(e.to_string())
    }
}

impl From<std::io::Error> for MenuLoadError {
    fn from(e: std::io::Error) -> Self {
        MenuLoadError::Io(e.to_string())
    }
}

/// Result type for menu loading
pub type Result<T> = std::result::Result<T, MenuLoadError>;
