use crate::core::session::PipelineSettings;

/// Validate the pipeline settings shared by every session
///
/// Rejects zero-sized queues and chunks (a zero-capacity queue would drop every frame)
/// and sampling temperatures outside `[0, 2]`.
pub fn validate_pipeline(settings: &PipelineSettings) -> Result<(), Box<dyn std::error::Error>> {
    let capacities = [
        ("AUDIO_QUEUE_CAPACITY", settings.audio_queue_capacity),
        ("TEXT_QUEUE_CAPACITY", settings.text_queue_capacity),
        ("TTS_QUEUE_CAPACITY", settings.tts_queue_capacity),
        ("AUDIO_CHUNK_SIZE", settings.audio_chunk_size),
    ];

    for (key, value) in capacities {
        if value == 0 {
            return Err(format!("{key} must be greater than zero").into());
        }
    }

    if settings.task_timeout.is_zero() {
        return Err("TTS_TASK_TIMEOUT_SECS must be greater than zero".into());
    }

    if !(0.0..=2.0).contains(&settings.default_temperature) {
        return Err(format!(
            "LLM_TEMPERATURE must be between 0 and 2, got {}",
            settings.default_temperature
        )
        .into());
    }

    if settings.default_model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".into());
    }

    Ok(())
}
