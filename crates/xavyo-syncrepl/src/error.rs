//! Sync session error types
//!
//! Error definitions with fatal/transient classification for the supervisor's
//! retry decision.

use thiserror::Error;

/// LDAP result code returned by a bind with a wrong DN or password.
pub const LDAP_INVALID_CREDENTIALS: u32 = 49;

/// Error raised by a directory session while connecting, binding or polling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The directory rejected the bind credentials.
    #[error("authentication failed: invalid credentials for '{bind_dn}'")]
    InvalidCredentials { bind_dn: String },

    /// The directory endpoint could not be reached.
    #[error("directory unreachable at {url}: {message}")]
    Unreachable {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any failure once the session is established (decoding errors,
    /// unexpected disconnects, non-success result codes).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SessionError {
    /// Get an error code for log classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            SessionError::Unreachable { .. } => "UNREACHABLE",
            SessionError::Protocol { .. } => "PROTOCOL_ERROR",
        }
    }

    // Convenience constructors

    /// Create an unreachable error.
    pub fn unreachable(url: impl Into<String>, message: impl Into<String>) -> Self {
        SessionError::Unreachable {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an unreachable error with source.
    pub fn unreachable_with_source(
        url: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SessionError::Unreachable {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        SessionError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source.
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SessionError::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure of a single delivery attempt to the sink.
///
/// Never leaves the publisher; it only exists to be logged.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to serialize change payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request timeout")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("sink rejected change with HTTP {status}")]
    Rejected { status: u16 },
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PublishError::Timeout
        } else if e.is_connect() {
            PublishError::Connect(e.to_string())
        } else {
            PublishError::Request(e.to_string())
        }
    }
}
