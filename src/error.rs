use thiserror::Error;

/// Failures surfaced by the relay, the provider client and the transcript client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// The request body was malformed. Reported to callers as 400.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The completion provider (or the relay, seen from a client) rejected the call.
    #[error("upstream failure{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    UpstreamFailure {
        status: Option<u16>,
        message: String,
    },

    /// Connecting to, or reading from, the remote side failed.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A single event payload could not be parsed. Never escalated past the reader.
    #[error("malformed fragment: {0}")]
    MalformedFragment(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The consumer went away before the stream finished.
    #[error("stream cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        RelayError::UpstreamFailure {
            status,
            message: message.into(),
        }
    }

    /// Human-facing text without the variant prefix, as carried in error frames.
    pub fn description(&self) -> String {
        match self {
            RelayError::InvalidInput(message) | RelayError::UpstreamFailure { message, .. } =>
                message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
