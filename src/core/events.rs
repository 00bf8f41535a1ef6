//! Client-facing events emitted by a voice session
//!
//! Every frame a session sends to its client goes through a [`ClientSink`]. The sink
//! owns the single write path to the transport, so JSON frames and audio frames from
//! independent tasks never interleave mid-frame.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::core::tts::AudioFormat;

pub const CONNECTED_MESSAGE: &str = "WebSocket voice connection established";
pub const SESSION_CLEARED_MESSAGE: &str = "Conversation history and ASR status cleared";

/// JSON control frames sent to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "connected")]
    Connected { message: String },
    #[serde(rename = "error")]
    Error { message: String, fatal: bool },
    #[serde(rename = "asr_result")]
    AsrResult { text: String },
    /// Incremental language model output
    #[serde(rename = "llm_response")]
    LlmResponse { text: String },
    #[serde(rename = "tts_start")]
    TtsStart {
        #[serde(flatten)]
        format: AudioFormat,
    },
    #[serde(rename = "tts_end")]
    TtsEnd,
    #[serde(rename = "session_cleared")]
    SessionCleared { message: String },
    #[serde(rename = "pong")]
    Pong,
}

impl OutgoingMessage {
    pub fn connected() -> Self {
        OutgoingMessage::Connected {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        OutgoingMessage::Error {
            message: message.into(),
            fatal,
        }
    }

    pub fn session_cleared() -> Self {
        OutgoingMessage::SessionCleared {
            message: SESSION_CLEARED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("Client connection closed")]
    Closed,
}

/// Write side of a client connection
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SinkError>;

    async fn send_audio(&self, audio: Bytes) -> Result<(), SinkError>;

    /// Flush pending frames and close the transport
    async fn close(&self);
}
