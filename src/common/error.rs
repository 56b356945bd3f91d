//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// Faults raised by a dictionary lookup. All of them resolve to a backend fault.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Dictionary service returned status {status}")]
    Status { status: u16 },

    #[error("Malformed dictionary response: {message}")]
    Malformed { message: String },

    #[error("Lookup task failed: {message}")]
    Task { message: String },
}

/// Errors surfaced by engine operations outside of the submission path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown language code '{code}'")]
    UnknownLanguage { code: String },

    #[error("{what} is not configured for this server")]
    NotConfigured { what: String },

    #[error("'{word}' is not a legal word")]
    IllegalWord { word: String },

    #[error("Channel worker for server {server_id} has stopped")]
    WorkerGone { server_id: u64 },
}

/// Errors from changing the log filter at runtime.
#[derive(Debug, Error)]
pub enum LogFilterError {
    #[error("Invalid log directive '{directives}': {message}")]
    InvalidDirective { directives: String, message: String },

    #[error("Log filter is no longer installed: {message}")]
    Unavailable { message: String },
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Store(StoreError::Database(e))
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
