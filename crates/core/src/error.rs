//! Error types for Precis operations.
//!
//! This module defines the main error type [`PrecisError`] which represents
//! everything that can go wrong below the fallback chains: HTTP calls,
//! malformed provider responses, storage, secrets and configuration.
//!
//! The chains themselves ([`crate::fetch::Acquirer::acquire`] and
//! [`crate::llm::Invoker::invoke`]) swallow these errors after logging them
//! and report "no result" as `None`.
//!
//! # Example
//!
//! ```rust
//! use precis_core::{PrecisError, Result};
//!
//! fn require_name(name: &str) -> Result<&str> {
//!     if name.trim().is_empty() {
//!         return Err(PrecisError::Validation("name is required".to_string()));
//!     }
//!     Ok(name)
//! }
//! # assert!(require_name(" ").is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Precis operations.
#[derive(Error, Debug)]
pub enum PrecisError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    ///
    /// Returned when an HTTP request exceeds the configured timeout duration.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Non-success HTTP status from a provider.
    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    /// The provider answered, but not with something we can use.
    ///
    /// Covers empty bodies, missing JSON fields and tool calls that all failed.
    #[error("Unexpected response from {provider}: {reason}")]
    BadResponse { provider: String, reason: String },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rejected user input (empty form field, malformed word list, ...).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blob storage errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Secret lookup errors.
    #[error("Secret '{name}' unavailable: {reason}")]
    Secret { name: String, reason: String },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Application configuration errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<toml::de::Error> for PrecisError {
    fn from(err: toml::de::Error) -> Self {
        PrecisError::ConfigError(err.to_string())
    }
}

/// Result type alias for PrecisError.
pub type Result<T> = std::result::Result<T, PrecisError>;
