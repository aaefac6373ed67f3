// src/error.rs

//! Unified error handling for the automation runtime.

use std::fmt;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// DevTools websocket failure
    #[cfg(feature = "cdp")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search criteria or record validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistent store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Browser surface error (tab gone, script failed, navigation lost)
    #[error("Surface error for {context}: {message}")]
    Surface { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a surface error with context.
    pub fn surface(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Surface {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is a validation failure, which is never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
