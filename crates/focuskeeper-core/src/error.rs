//! Core error types for focuskeeper-core.
//!
//! Two families live here. [`CoreError`] and its children are real failures
//! (storage, configuration, notification delivery). [`Rejection`] is not a
//! failure at all: it is the reason an illegal timer transition was refused
//! and the state left untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focuskeeper-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Notification gateway errors
    #[error("Notification error: {0}")]
    Gateway(#[from] GatewayError),

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

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The stored timer record could not be decoded
    #[error("Corrupt timer record: {0}")]
    Corrupt(String),

    /// Backend refused the write (used by in-memory backends)
    #[error("Write rejected: {0}")]
    WriteRejected(String),
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

    /// Unknown dotted key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not determine where configuration lives
    #[error("Cannot determine data directory")]
    NoDataDir,
}

/// Notification gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Gateway is not available on this host
    #[error("Notification gateway unavailable: {0}")]
    Unavailable(String),

    /// The OS refused to display the notification
    #[error("Failed to present notification: {0}")]
    PresentFailed(String),

    /// Handle does not refer to a pending notification
    #[error("Unknown notification handle: {0}")]
    UnknownHandle(String),

    /// Scheduling requires an async runtime that is not running
    #[error("No async runtime available to schedule notification")]
    NoRuntime,
}

/// Why a timer operation was refused.
///
/// A rejection leaves the timer untouched. Callers treat it as a no-op.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("the session is paused; resume or reset it first")]
    SessionPaused,
    #[error("no session is running")]
    NotRunning,
    #[error("no session is paused")]
    NotPaused,
    #[error("there is no active session")]
    NoActiveSession,
    #[error("focus sessions cannot be skipped")]
    FocusNotSkippable,
    #[error("the session has completed; acknowledge it first")]
    CompletionPending,
    #[error("the session has not completed yet")]
    NotCompleted,
    #[error("session duration must be greater than zero")]
    ZeroDuration,
    #[error("the plan has no further sessions; acknowledge to finish it")]
    PlanExhausted,
}

/// The timer driver task has exited and no longer accepts input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("timer service has stopped")]
pub struct ServiceStopped;

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
