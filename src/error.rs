//! Error types for the lull scheduler.

/// Top-level error type for the suspension scheduler.
#[derive(Debug, thiserror::Error)]
pub enum LullError {
    /// Host configuration or user settings error.
    #[error("config error: {0}")]
    Config(String),

    /// Session or durable key-value store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Host environment call failed (tab query, tab update).
    #[error("host error: {0}")]
    Host(String),

    /// Durable alarm registry error.
    #[error("alarm error: {0}")]
    Alarm(String),

    /// Malformed or unsupported command envelope.
    #[error("contract error: {0}")]
    Contract(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LullError>;
