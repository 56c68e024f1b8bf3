//! Error types for Docker Engine API operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DockerError>;

#[derive(Error, Debug)]
pub enum DockerError {
    /// A required argument was empty or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection level failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The daemon answered with a non-success status code
    #[error("Docker API call to '{uri}' failed with status code {status} \"{reason}\"{}", message_suffix(.message))]
    Engine {
        uri: String,
        status: u16,
        reason: String,
        message: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a response body
    #[error("Invalid JSON in response: {0}")]
    Decode(serde_json::Error),

    /// Response content that does not have the expected structure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error detail reported inside an otherwise successful response stream
    #[error("{0}")]
    Daemon(String),

    /// The daemon response was complete but not usable
    #[error("{0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An update listener stopped the operation
    #[error("Operation aborted: {0}")]
    Aborted(String),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!(" and message \"{}\"", message),
        _ => String::new(),
    }
}

impl DockerError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DockerError::InvalidArgument(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        DockerError::Protocol(message.into())
    }

    /// Status code of an engine error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            DockerError::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DockerError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            DockerError::Io(err.into())
        } else {
            DockerError::Decode(err)
        }
    }
}

impl From<reqwest::Error> for DockerError {
    fn from(err: reqwest::Error) -> Self {
        DockerError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for DockerError {
    fn from(err: url::ParseError) -> Self {
        DockerError::Configuration(err.to_string())
    }
}
