//! Error types for the sync subsystem

use thiserror::Error;

/// Handshake rejections. Fatal: the connection is never established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Missing user id in handshake")]
    MissingUserId,

    #[error("Missing authentication token in handshake")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token subject '{subject}' does not match user '{user_id}'")]
    SubjectMismatch { subject: String, user_id: String },
}

/// A malformed inbound event, reported to its sender only
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct ValidationError {
    /// Wire name of the failing event (`"unknown"` when unrecoverable)
    pub operation: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn missing(operation: impl Into<String>, field: &str) -> Self {
        Self::new(operation, format!("Missing required field '{}'", field))
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("SYNC_JWT_SECRET must be at least {min} characters")]
    SecretTooShort { min: usize },
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
