// src/error.rs - Error types shared across the relay
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to persist store file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Failure of a single time-server query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Time server did not answer within {0}ms")]
    Timeout(u64),
    #[error("Malformed time server reply: {0}")]
    Malformed(String),
    #[error("No time server configured")]
    NoServer,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Serial IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Link closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Failed to start watchdog: {0}")]
    Enable(String),
    #[error("Failed to record reset cause: {0}")]
    Marker(#[from] std::io::Error),
}

/// Rejected console line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("command too long ({0} > {max} chars)", max = crate::console::MAX_COMMAND_LEN)]
    TooLong(usize),
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Time query error: {0}")]
    Query(#[from] QueryError),
    #[error("Watchdog error: {0}")]
    Watchdog(#[from] WatchdogError),
}
