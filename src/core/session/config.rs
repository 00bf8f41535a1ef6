//! Per-session options and pipeline tunables

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_LLM_MODEL: &str = "deepseek-v3.1";
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_WARNING_CLIP: &str = "scripts/QuotaWarning.wav";

/// Options a client selects when opening a voice connection.
///
/// Parsed from the upgrade request's query string. Unset fields fall back to the
/// server's [`PipelineSettings`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub language: Option<String>,
    pub speaker: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub knowledge_key: Option<String>,
    pub model: Option<String>,
}

impl SessionOptions {
    pub fn model<'a>(&'a self, settings: &'a PipelineSettings) -> &'a str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(settings.default_model.as_str())
    }

    /// Sampling temperature, `None` when the effective value is not positive
    pub fn temperature(&self, settings: &PipelineSettings) -> Option<f32> {
        Some(self.temperature.unwrap_or(settings.default_temperature)).filter(|t| *t > 0.0)
    }

    /// Output limit, `None` when unlimited
    pub fn max_tokens(&self, settings: &PipelineSettings) -> Option<u32> {
        Some(self.max_tokens.unwrap_or(settings.default_max_tokens)).filter(|m| *m > 0)
    }

    pub fn knowledge_key(&self) -> Option<&str> {
        self.knowledge_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|p| !p.is_empty())
    }
}

/// Queue sizes, timeouts and defaults shared by every session on a server
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Inbound audio frames buffered before drop-newest kicks in
    pub audio_queue_capacity: usize,
    /// Inbound control frames buffered before drop-newest kicks in
    pub text_queue_capacity: usize,
    /// Synthesis tasks buffered per session
    pub tts_queue_capacity: usize,
    /// Upper bound on waiting for the previous synthesis task to finish
    pub task_timeout: Duration,
    pub recognizer_max_retries: u32,
    pub recognizer_retry_delay: Duration,
    pub recognizer_poll_interval: Duration,
    /// Delay between starting the recognizer and announcing the connection
    pub connect_delay: Duration,
    pub enqueue_retries: u32,
    pub enqueue_retry_delay: Duration,
    /// Maximum size of one outbound audio frame
    pub audio_chunk_size: usize,
    pub warning_clip_path: PathBuf,
    pub default_model: String,
    pub default_temperature: f32,
    /// Zero means unlimited
    pub default_max_tokens: u32,
    pub knowledge_top_k: usize,
    /// Submit recognizer usage records to the usage sink
    pub record_usage: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            audio_queue_capacity: 100,
            text_queue_capacity: 10,
            tts_queue_capacity: 100,
            task_timeout: Duration::from_secs(30),
            recognizer_max_retries: 10,
            recognizer_retry_delay: Duration::from_secs(2),
            recognizer_poll_interval: Duration::from_secs(5),
            connect_delay: Duration::from_millis(500),
            enqueue_retries: 3,
            enqueue_retry_delay: Duration::from_millis(100),
            audio_chunk_size: 8192,
            warning_clip_path: PathBuf::from(DEFAULT_WARNING_CLIP),
            default_model: DEFAULT_LLM_MODEL.to_string(),
            default_temperature: DEFAULT_TEMPERATURE,
            default_max_tokens: 0,
            knowledge_top_k: 5,
            record_usage: true,
        }
    }
}
