//! Error types for staging, flattening and querying
//!
//! Every variant is a user-recoverable condition: the governor turns it into
//! a failed envelope carrying `error` and `error_type`, so callers only ever
//! branch on `success`.

use thiserror::Error;

/// Crate-wide error
#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing required parameter '{param}' for {operation}")]
    MissingParameter { operation: String, param: String },

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("Unknown operation '{name}'. Available: {}", available.join(", "))]
    UnknownOperation { name: String, available: Vec<String> },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Cache key '{0}' not found or expired")]
    CacheMiss(String),

    #[error("Cache key '{key}' holds {found}, not a tabular dataset; run flatten_data first")]
    NotTabular { key: String, found: &'static str },

    #[error("Unknown column '{column}'. Available columns: {}", available.join(", "))]
    UnknownColumn { column: String, available: Vec<String> },

    #[error("Invalid condition at position {position}: {message}")]
    InvalidCondition { position: usize, message: String },

    #[error("No items to flatten")]
    NoItems,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn missing(operation: impl Into<String>, param: impl Into<String>) -> Self {
        Self::MissingParameter {
            operation: operation.into(),
            param: param.into(),
        }
    }

    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Stable tag copied into `GovernedResponse::error_type`
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::MissingParameter { .. } => "MissingParameter",
            Error::InvalidParameter { .. } => "InvalidParameter",
            Error::UnknownOperation { .. } => "UnknownOperation",
            Error::UnknownTool(_) => "UnknownTool",
            Error::CacheMiss(_) => "CacheMiss",
            Error::NotTabular { .. } => "NotTabular",
            Error::UnknownColumn { .. } => "UnknownColumn",
            Error::InvalidCondition { .. } => "InvalidCondition",
            Error::NoItems => "NoItems",
            Error::Serialization(_) => "Serialization",
            Error::Configuration(_) => "Configuration",
            Error::Internal(_) => "Internal",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
