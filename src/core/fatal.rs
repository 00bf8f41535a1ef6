//! Provider error classification and the warn-then-disconnect shutdown
//!
//! Every asynchronous provider failure ends up in [`report_provider_error`]. Transient
//! failures become a non-fatal `error` frame. Quota, credential and account failures
//! start [`begin_fatal_shutdown`]: recognition input is suppressed at once, the warning
//! clip is played to the client, and only then is the fatal `error` frame sent and the
//! connection closed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::events::OutgoingMessage;
use crate::core::session::Session;
use crate::core::tts::AudioFormat;

/// Vendor phrases that mean the session cannot continue
pub const FATAL_PHRASES: &[&str] = &[
    "quota exceeded",
    "quota exhausted",
    "pkg exhausted",
    "allowance has been exhausted",
    "insufficient quota",
    "quota limit",
    "unauthorized",
    "authentication failed",
    "invalid credentials",
    "api key invalid",
    "api key expired",
    "account suspended",
    "account disabled",
];

const CLIP_DEFAULT_DURATION: Duration = Duration::from_secs(3);
const CLIP_MIN_DURATION: Duration = Duration::from_secs(1);
const CLIP_MAX_DURATION: Duration = Duration::from_secs(10);

/// Whether a provider error message describes a quota, credential or account failure
pub fn is_fatal_error(message: &str) -> bool {
    let message = message.to_lowercase();
    FATAL_PHRASES.iter().any(|phrase| message.contains(phrase))
}

#[derive(Debug, Error)]
pub enum WarningClipError {
    #[error("Warning clip not found: {0}")]
    NotFound(String),
    #[error("Failed to decode warning clip: {0}")]
    Decode(#[from] hound::Error),
    #[error("Unsupported warning clip format: {0}")]
    UnsupportedFormat(String),
    #[error("Warning clip loader failed: {0}")]
    Loader(String),
}

/// Pre-recorded PCM clip explaining why the call ended
#[derive(Debug, Clone)]
pub struct WarningClip {
    pub format: AudioFormat,
    pub pcm: Bytes,
}

impl WarningClip {
    /// Resolve a clip path relative to the working directory or up to two parents
    pub fn locate(path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }

        [PathBuf::new(), PathBuf::from(".."), PathBuf::from("../..")]
            .into_iter()
            .map(|base| base.join(path))
            .find(|candidate| candidate.exists())
    }

    /// Read a 16-bit integer PCM WAV file
    pub fn load(path: &Path) -> Result<Self, WarningClipError> {
        let located = Self::locate(path)
            .ok_or_else(|| WarningClipError::NotFound(path.display().to_string()))?;

        let mut reader = hound::WavReader::open(&located)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(WarningClipError::UnsupportedFormat(format!(
                "{:?} {} bit",
                spec.sample_format, spec.bits_per_sample
            )));
        }

        let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        Ok(Self {
            format: AudioFormat::new(spec.sample_rate, spec.channels, spec.bits_per_sample),
            pcm: Bytes::from(pcm),
        })
    }

    /// Playback time with a 10% margin, clamped to one to ten seconds
    pub fn play_duration(&self) -> Duration {
        let byte_rate = self.format.byte_rate();
        let estimate = if byte_rate == 0 {
            CLIP_DEFAULT_DURATION
        } else {
            Duration::from_secs_f64(self.pcm.len() as f64 / byte_rate as f64 * 1.1)
        };

        estimate.clamp(CLIP_MIN_DURATION, CLIP_MAX_DURATION)
    }
}

/// Route a provider error to the transient or the fatal path
pub async fn report_provider_error(session: &Arc<Session>, service: &str, detail: &str) {
    if is_fatal_error(detail) {
        begin_fatal_shutdown(session, service, detail);
        return;
    }

    warn!(session_id = %session.id(), "{} error: {}", service, detail);
    session
        .send(OutgoingMessage::error(format!("{service} error: {detail}"), false))
        .await;
}

/// Start the warn-then-disconnect sequence.
///
/// Returns immediately; the warning clip, the fatal error frame and the close run on a
/// background task. A second call while a shutdown is in progress does nothing.
pub fn begin_fatal_shutdown(session: &Arc<Session>, service: &str, detail: &str) {
    {
        let mut state = session.state();
        if state.is_fatal() {
            return;
        }
        state.mark_fatal();
        state.cancel_turn();
    }
    session.set_active(false);

    let message = format!("{service} error: {detail}");
    error!(session_id = %session.id(), "Fatal provider error, disconnecting: {}", message);

    let session = session.clone();
    tokio::spawn(async move {
        match play_warning(&session).await {
            Ok(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = session.scope().cancelled() => {}
                }
            }
            Err(e) => warn!(session_id = %session.id(), "Warning clip not played: {}", e),
        }

        session.send(OutgoingMessage::error(message, true)).await;
        session.sink().close().await;
        session.shutdown();
    });
}

/// Stream the warning clip bracketed by `tts_start`/`tts_end`
async fn play_warning(session: &Arc<Session>) -> Result<Duration, WarningClipError> {
    let path = session.settings().warning_clip_path.clone();
    let clip = tokio::task::spawn_blocking(move || WarningClip::load(&path))
        .await
        .map_err(|e| WarningClipError::Loader(e.to_string()))??;

    info!(
        session_id = %session.id(),
        bytes = clip.pcm.len(),
        "Playing fatal error warning clip"
    );

    session
        .send(OutgoingMessage::TtsStart {
            format: clip.format,
        })
        .await;

    let chunk_size = session.settings().audio_chunk_size.max(1);
    let mut offset = 0;
    while offset < clip.pcm.len() {
        let end = (offset + chunk_size).min(clip.pcm.len());
        if session.sink().send_audio(clip.pcm.slice(offset..end)).await.is_err() {
            break;
        }
        offset = end;
    }

    session.send(OutgoingMessage::TtsEnd).await;
    Ok(clip.play_duration())
}
