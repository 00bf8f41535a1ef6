//! Recognition usage accounting

use async_trait::async_trait;

/// Bytes of 16 kHz mono 16-bit PCM per second of audio
pub const PCM_BYTES_PER_SECOND: u64 = 32_000;

/// Usage of the recognizer for one finished utterance
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub session_id: String,
    pub correlation_id: String,
    pub audio_seconds: f64,
    pub audio_bytes: u64,
}

impl UsageRecord {
    pub fn for_recognition(session_id: &str, correlation_id: &str, audio_seconds: f64) -> Self {
        Self {
            session_id: session_id.to_string(),
            correlation_id: correlation_id.to_string(),
            audio_seconds,
            audio_bytes: (audio_seconds * PCM_BYTES_PER_SECOND as f64) as u64,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UsageError {
    #[error("Failed to record usage: {0}")]
    RecordFailed(String),
}

/// Destination for usage records. Calls are fire-and-forget from the session's view.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageError>;
}
