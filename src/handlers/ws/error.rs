//! WebSocket error types

use thiserror::Error;

use crate::core::providers::ProviderError;
use crate::core::stt::STTError;

/// WebSocket handler error types
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// Provider collaborators could not be created for the connection
    #[error("Failed to initialize voice session: {0}")]
    SessionSetup(#[from] ProviderError),

    /// Recognizer callbacks could not be registered
    #[error("Failed to initialize speech recognition: {0}")]
    RecognizerSetup(#[from] STTError),

    /// Inbound control frame is not valid JSON or lacks a `type`
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Result type for WebSocket operations
pub type WebSocketResult<T> = Result<T, WebSocketError>;
