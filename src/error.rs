use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown pull mode: {0}")]
    UnknownPullMode(String),
    #[error("Unknown edge mode: {0}")]
    UnknownEdgeMode(String),
    #[error("Line not found: {0}")]
    LineNotFound(String),
    #[error("Hardware config error on {line}: {reason}")]
    HardwareConfig { line: String, reason: String },
    #[error("Hardware wait error on {line}: {reason}")]
    HardwareWait { line: String, reason: String },
    #[error("Hardware read error on {line}: {reason}")]
    HardwareRead { line: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Notification channel closed")]
    ChannelClosed,
}

impl AppError {
    /// Whether the error should stop the process.
    ///
    /// Only level reads are recovered in place; everything else is a startup
    /// failure or a dead watcher.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AppError::HardwareRead { .. })
    }
}
