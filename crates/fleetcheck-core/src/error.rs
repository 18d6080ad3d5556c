//! Core error types for fleetcheck-core.
//!
//! The hierarchy separates four failure families: datastore errors,
//! configuration errors, access errors (not-found vs. unauthorized vs.
//! group-not-configured are distinct so callers can render distinct
//! messages), and transport errors. Side-effect sends log and continue;
//! primary state mutations propagate.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fleetcheck-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Access-control and lookup errors
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    /// Chat-transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Stored value could not be decoded into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),
}

/// Access-control and lookup errors.
///
/// Not-found is normally surfaced as `Ok(None)` from queries; the
/// `NotFound` variant exists for operations that cannot proceed at all
/// without the row (e.g. resetting a check-in by id).
#[derive(Error, Debug)]
pub enum AccessError {
    /// The named record does not exist
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Membership or role check failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No compliance group has been configured yet
    #[error("Compliance group is not configured")]
    GroupNotConfigured,

    /// The group is paused and mutating actions are blocked
    #[error("Group {0} is paused")]
    GroupPaused(i64),
}

/// Chat-transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP-level failure
    #[error("Transport request failed: {0}")]
    Http(String),

    /// The request did not complete within the bounded timeout
    #[error("Transport request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The remote side rejected the payload
    #[error("Transport rejected request: {0}")]
    Rejected(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { timeout_secs: 0 }
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
