//! Inbound frame consumer
//!
//! The read loop only enqueues frames. This consumer drains both inbound queues for the
//! lifetime of the session: audio goes to the recognizer, control frames to session
//! control.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::WebSocketError;
use super::messages::{IncomingMessage, OutgoingMessage};
use crate::core::session::Session;

/// Drain the audio and text queues until the session shuts down
pub async fn run_inbound_consumer(
    session: Arc<Session>,
    mut audio_rx: mpsc::Receiver<Bytes>,
    mut text_rx: mpsc::Receiver<String>,
) {
    loop {
        tokio::select! {
            _ = session.scope().cancelled() => break,
            Some(audio) = audio_rx.recv() => handle_audio(&session, audio).await,
            Some(text) = text_rx.recv() => handle_text(&session, &text).await,
            else => break,
        }
    }

    debug!(session_id = %session.id(), "Inbound consumer stopped");
}

/// Forward one audio frame to the recognizer.
///
/// Frames are dropped while a fatal shutdown is in progress, while the recognizer is
/// inactive, and while synthesized speech is playing so the recognizer never hears the
/// assistant's own voice.
pub async fn handle_audio(session: &Arc<Session>, audio: Bytes) {
    if session.is_fatal() || !session.is_active() {
        return;
    }
    if session.is_synthesis_audible() {
        debug!(session_id = %session.id(), bytes = audio.len(), "Synthesis audible, dropping audio");
        return;
    }

    let stt = &session.providers().stt;
    if let Err(e) = stt.send_audio(audio).await {
        if e.is_not_running() {
            warn!(session_id = %session.id(), "Recognizer stopped, restarting: {}", e);
            if let Err(e) = stt.stop_connection().await {
                warn!(session_id = %session.id(), "Failed to stop recognizer: {}", e);
            }
            session.request_recognizer_restart();
        } else {
            warn!(session_id = %session.id(), "Failed to send audio to recognizer: {}", e);
        }
    }
}

/// Dispatch one control frame. Malformed and unknown frames are logged and ignored.
pub async fn handle_text(session: &Arc<Session>, text: &str) {
    let message = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            let err = WebSocketError::InvalidMessage(e.to_string());
            warn!(session_id = %session.id(), "{}", err);
            return;
        }
    };

    match message {
        IncomingMessage::NewSession => {
            info!(session_id = %session.id(), "Starting new conversation");
            session.reset();
            if let Err(e) = session.providers().stt.stop_connection().await {
                warn!(session_id = %session.id(), "Failed to stop recognizer: {}", e);
            }
            session.request_recognizer_restart();
            session.send(OutgoingMessage::session_cleared()).await;
        }
        IncomingMessage::Ping => session.send(OutgoingMessage::Pong).await,
        IncomingMessage::Unknown => {
            warn!(session_id = %session.id(), message = %text, "Unknown message type");
        }
    }
}
