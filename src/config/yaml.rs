use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment variables can
/// override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// pipeline:
///   audio_queue_capacity: 100
///   text_queue_capacity: 10
///   tts_queue_capacity: 100
///   task_timeout_secs: 30
///   asr_max_retries: 10
///   asr_retry_delay_ms: 2000
///   asr_poll_interval_ms: 5000
///   asr_connect_delay_ms: 500
///   enqueue_retries: 3
///   enqueue_retry_delay_ms: 100
///   audio_chunk_size: 8192
///   warning_clip_path: "scripts/QuotaWarning.wav"
///   record_usage: true
///
/// llm:
///   model: "deepseek-v3.1"
///   temperature: 0.6
///   max_tokens: 0
///   knowledge_top_k: 5
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub llm: Option<LlmYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Queue sizes and timings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub audio_queue_capacity: Option<usize>,
    pub text_queue_capacity: Option<usize>,
    pub tts_queue_capacity: Option<usize>,
    pub task_timeout_secs: Option<u64>,
    pub asr_max_retries: Option<u32>,
    pub asr_retry_delay_ms: Option<u64>,
    pub asr_poll_interval_ms: Option<u64>,
    pub asr_connect_delay_ms: Option<u64>,
    pub enqueue_retries: Option<u32>,
    pub enqueue_retry_delay_ms: Option<u64>,
    pub audio_chunk_size: Option<usize>,
    pub warning_clip_path: Option<String>,
    pub record_usage: Option<bool>,
}

/// Language model defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub knowledge_top_k: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

pipeline:
  audio_queue_capacity: 50
  asr_retry_delay_ms: 1000
  warning_clip_path: "/opt/clips/warning.wav"
  record_usage: false

llm:
  model: "qwen-max"
  temperature: 0.2
  max_tokens: 300
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));

        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.audio_queue_capacity, Some(50));
        assert_eq!(pipeline.asr_retry_delay_ms, Some(1000));
        assert_eq!(
            pipeline.warning_clip_path,
            Some("/opt/clips/warning.wav".to_string())
        );
        assert_eq!(pipeline.record_usage, Some(false));
        assert_eq!(pipeline.tts_queue_capacity, None);

        let llm = config.llm.unwrap();
        assert_eq!(llm.model, Some("qwen-max".to_string()));
        assert_eq!(llm.max_tokens, Some(300));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.unwrap().port, Some(9000));
        assert!(config.pipeline.is_none());
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_yaml_from_file_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: not-a-number\n").unwrap();

        let err = YamlConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML config"));
    }
}
