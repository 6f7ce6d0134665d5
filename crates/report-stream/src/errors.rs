/// A streaming channel failed: it could not be opened, dropped, went idle or
/// closed without a terminal event. Every such failure hands the session over
/// to the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel transport error: {message}")]
pub struct ChannelError {
    message: String,
}

impl ChannelError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by the one-shot fallback request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    /// Network failure or timeout.
    #[error("fallback transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status.
    #[error("fallback request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not match the report payload shape.
    #[error("fallback response could not be decoded: {0}")]
    Decode(String),
}

/// Top-level error type for the public pipeline API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// Invalid pipeline configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid report request.
    #[error("validation error: {0}")]
    Validation(String),
    /// The channel failed and the blocking fallback request failed too.
    #[error(transparent)]
    Fallback(#[from] FallbackError),
    /// The backend reported a terminal error event.
    #[error("report failed: {0}")]
    Remote(String),
    /// The session was disposed before it produced a result.
    #[error("cancelled")]
    Cancelled,
}

impl ReportError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Text shown to the user when a session ends with this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
