/// Errors that end a chat round or reject it before it starts.
///
/// Malformed JSON inside a stream is deliberately absent: a bad fragment is
/// degraded to plain text and never terminates an otherwise healthy stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid user input (empty submission, bad attachment, malformed URL).
    #[error("validation error: {0}")]
    Validation(String),
    /// The provider or gateway answered with a non-success status.
    #[error("upstream error ({status}): {message}")]
    UpstreamHttp { status: u16, message: String },
    /// Connection failure or read error while talking to the gateway.
    #[error("transport error: {0}")]
    Transport(String),
    /// The caller aborted the round.
    #[error("round cancelled")]
    Cancelled,
    /// A round is already in progress for this session.
    #[error("a chat round is already in progress")]
    Busy,
    /// Invalid process or client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Internal invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            status,
            message: message.into(),
        }
    }

    /// True when the error was raised before any network activity.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// HTTP status carried by upstream failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure reported by the persistence collaborator. Logged only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(value: std::io::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self(value.to_string())
    }
}
