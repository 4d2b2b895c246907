use thiserror::Error;

/// Errors returned by [`AnalyticsLogger`](crate::AnalyticsLogger).
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The logger is not initialized or was given invalid settings.
    #[error("[gae-analytics] configuration error: {0}")]
    Configuration(String),

    /// The event was rejected before sending.
    #[error("[gae-analytics] invalid event: {0}")]
    InvalidEvent(String),

    /// Transport-level failure (DNS, refused connection, timeout).
    #[error("[gae-analytics] network error: {0}")]
    Network(String),

    /// The logging endpoint answered with a non-success status.
    #[error("[gae-analytics] logging endpoint returned {status}")]
    Status { status: u16 },

    /// The discreet send queue was full and the event was dropped.
    #[error("[gae-analytics] discreet send queue full ({capacity} pending), event dropped")]
    QueueFull { capacity: usize },

    #[error("[gae-analytics] serialization failed: {0}")]
    Serialization(String),
}

impl LoggerError {
    /// True for failures of the send itself, as opposed to caller mistakes.
    pub fn is_network(&self) -> bool {
        matches!(self, LoggerError::Network(_) | LoggerError::Status { .. })
    }
}

impl From<serde_json::Error> for LoggerError {
    fn from(err: serde_json::Error) -> Self {
        LoggerError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoggerError>;
