use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::ServerConfig;
use super::utils::{parse_bool, parse_env};
use super::yaml::YamlConfig;
use crate::core::session::PipelineSettings;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration providing base values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let pipeline = yaml.pipeline.unwrap_or_default();
    let llm = yaml.llm.unwrap_or_default();
    let defaults = ServerConfig::default();
    let settings = PipelineSettings::default();

    // Helper macro to get a parsed value with priority: ENV > YAML > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env::var($env_var) {
                Ok(raw) => parse_env($env_var, &raw)?,
                Err(_) => $yaml_value.unwrap_or($default),
            }
        };
    }

    let host = env::var("HOST")
        .ok()
        .or(server.host)
        .unwrap_or(defaults.host);
    let port: u16 = get_value!("PORT", server.port, defaults.port);

    let record_usage = match env::var("RECORD_USAGE") {
        Ok(raw) => parse_bool(&raw)
            .ok_or_else(|| format!("Invalid RECORD_USAGE environment variable: {raw}"))?,
        Err(_) => pipeline.record_usage.unwrap_or(settings.record_usage),
    };

    let warning_clip_path = env::var("WARNING_CLIP_PATH")
        .ok()
        .or(pipeline.warning_clip_path)
        .map(PathBuf::from)
        .unwrap_or(settings.warning_clip_path);

    let default_model = env::var("LLM_MODEL")
        .ok()
        .or(llm.model)
        .unwrap_or(settings.default_model);

    let pipeline = PipelineSettings {
        audio_queue_capacity: get_value!(
            "AUDIO_QUEUE_CAPACITY",
            pipeline.audio_queue_capacity,
            settings.audio_queue_capacity
        ),
        text_queue_capacity: get_value!(
            "TEXT_QUEUE_CAPACITY",
            pipeline.text_queue_capacity,
            settings.text_queue_capacity
        ),
        tts_queue_capacity: get_value!(
            "TTS_QUEUE_CAPACITY",
            pipeline.tts_queue_capacity,
            settings.tts_queue_capacity
        ),
        task_timeout: Duration::from_secs(get_value!(
            "TTS_TASK_TIMEOUT_SECS",
            pipeline.task_timeout_secs,
            settings.task_timeout.as_secs()
        )),
        recognizer_max_retries: get_value!(
            "ASR_MAX_RETRIES",
            pipeline.asr_max_retries,
            settings.recognizer_max_retries
        ),
        recognizer_retry_delay: Duration::from_millis(get_value!(
            "ASR_RETRY_DELAY_MS",
            pipeline.asr_retry_delay_ms,
            settings.recognizer_retry_delay.as_millis() as u64
        )),
        recognizer_poll_interval: Duration::from_millis(get_value!(
            "ASR_POLL_INTERVAL_MS",
            pipeline.asr_poll_interval_ms,
            settings.recognizer_poll_interval.as_millis() as u64
        )),
        connect_delay: Duration::from_millis(get_value!(
            "ASR_CONNECT_DELAY_MS",
            pipeline.asr_connect_delay_ms,
            settings.connect_delay.as_millis() as u64
        )),
        enqueue_retries: get_value!(
            "ENQUEUE_RETRIES",
            pipeline.enqueue_retries,
            settings.enqueue_retries
        ),
        enqueue_retry_delay: Duration::from_millis(get_value!(
            "ENQUEUE_RETRY_DELAY_MS",
            pipeline.enqueue_retry_delay_ms,
            settings.enqueue_retry_delay.as_millis() as u64
        )),
        audio_chunk_size: get_value!(
            "AUDIO_CHUNK_SIZE",
            pipeline.audio_chunk_size,
            settings.audio_chunk_size
        ),
        warning_clip_path,
        default_model,
        default_temperature: get_value!(
            "LLM_TEMPERATURE",
            llm.temperature,
            settings.default_temperature
        ),
        default_max_tokens: get_value!(
            "LLM_MAX_TOKENS",
            llm.max_tokens,
            settings.default_max_tokens
        ),
        knowledge_top_k: get_value!(
            "KNOWLEDGE_TOP_K",
            llm.knowledge_top_k,
            settings.knowledge_top_k
        ),
        record_usage,
    };

    Ok(ServerConfig {
        host,
        port,
        pipeline,
    })
}
