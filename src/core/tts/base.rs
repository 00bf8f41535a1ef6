//! # Synthesizer trait
//!
//! Abstraction over streaming text-to-speech providers. A provider reports its PCM
//! output format up front and pushes audio through a chunk callback while
//! [`BaseTTS::synthesize`] is running; the call returns once synthesis finished,
//! failed, or the supplied cancellation token fired.
//!
//! ```rust,ignore
//! let format = tts.format();
//! let on_audio: TTSAudioCallback = Arc::new(|chunk| Box::pin(async move {
//!     println!("received {} bytes", chunk.len());
//! }));
//! tts.synthesize(scope.child_token(), "你好。", on_audio).await?;
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::Future;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// PCM stream format produced by a synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(rename = "bitDepth")]
    pub bit_depth: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Bytes of audio per second of playback, zero when the format is unknown
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.bit_depth as u64 / 8
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(16000, 1, 16)
    }
}

/// TTS-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum TTSError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Synthesis cancelled")]
    Cancelled,
}

/// Callback receiving synthesized audio in arrival order
pub type TTSAudioCallback =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Streaming speech synthesizer used by a voice session
#[async_trait]
pub trait BaseTTS: Send + Sync {
    /// Format of the PCM bytes passed to the audio callback
    fn format(&self) -> AudioFormat;

    /// Synthesize `text`, streaming audio to `on_audio` until done or `scope` is cancelled.
    ///
    /// The callback is awaited for each chunk, so chunks reach it strictly in order.
    async fn synthesize(
        &self,
        scope: CancellationToken,
        text: &str,
        on_audio: TTSAudioCallback,
    ) -> Result<(), TTSError>;

    /// Release provider resources at the end of a session
    async fn close(&self) -> Result<(), TTSError> {
        Ok(())
    }

    fn provider(&self) -> &'static str;
}
