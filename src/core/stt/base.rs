use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

/// A recognition hypothesis delivered by a streaming recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionEvent {
    /// Cumulative text recognized so far for the current utterance
    pub text: String,
    /// Whether the recognizer considers the utterance finished
    pub is_final: bool,
    /// Audio duration covered by this result
    pub duration: Duration,
    /// Provider-assigned correlation id for the utterance
    pub correlation_id: String,
}

impl RecognitionEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            duration: Duration::ZERO,
            correlation_id: String::new(),
        }
    }

    pub fn final_result(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            duration,
            correlation_id: String::new(),
        }
    }
}

/// Error types for STT operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Recognizer not running: {0}")]
    NotRunning(String),
    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl STTError {
    /// Whether the recognizer stream stalled and must be restarted before it accepts audio
    pub fn is_not_running(&self) -> bool {
        matches!(self, STTError::NotRunning(_)) || self.to_string().contains("not running")
    }
}

/// Callback type for recognition results
pub type STTResultCallback =
    Arc<dyn Fn(RecognitionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for asynchronous recognizer errors
pub type STTErrorCallback =
    Arc<dyn Fn(STTError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Streaming speech recognizer used by a voice session.
///
/// Results and errors arrive through the callbacks registered with [`BaseSTT::init`];
/// `connect` only establishes the stream and returns once it is receiving.
#[async_trait::async_trait]
pub trait BaseSTT: Send + Sync {
    /// Register the result and error callbacks. Called once, before `connect`.
    async fn init(
        &self,
        on_result: STTResultCallback,
        on_error: STTErrorCallback,
    ) -> Result<(), STTError>;

    /// Open the recognition stream
    async fn connect(&self) -> Result<(), STTError>;

    /// Close the recognition stream. Safe to call when already stopped.
    async fn stop_connection(&self) -> Result<(), STTError>;

    /// Whether the stream is open and accepting audio
    fn is_active(&self) -> bool;

    /// Forward raw PCM audio to the recognizer
    async fn send_audio(&self, audio: Bytes) -> Result<(), STTError>;

    fn provider(&self) -> &'static str;
}
