//! Error types for Smart Logger

use thiserror::Error;

/// Main error type for Smart Logger operations
///
/// Usage mistakes (unknown timers, duplicate timers, unknown counters) are
/// never errors: they are recorded as `warn` entries in the buffer instead.
/// The variants here only surface from configuration loading, sink I/O
/// during a flush, and the current-run accessor.
#[derive(Error, Debug)]
pub enum SmartLogError {
    /// A console or attachment sink rejected the flushed output
    #[error("Sink error: {0}")]
    Sink(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing configuration or serializing output
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// External console subscription could not be established or removed
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The current-run accessor was used outside of an active run
    #[error("No active smart log run on this thread or task")]
    NoActiveRun,
}

/// Result type alias using SmartLogError
pub type SmartLogResult<T> = Result<T, SmartLogError>;
