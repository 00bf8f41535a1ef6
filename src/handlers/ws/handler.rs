//! Axum WebSocket handler
//!
//! Upgrades `/ws/voice` requests and runs one voice session per connection: the writer
//! task, the inbound consumer, the recognizer supervisor and the synthesis queue run
//! alongside the read loop below until either side closes.

use std::sync::{Arc, Weak};

use axum::{
    extract::{
        Query, State,
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::SplitStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::events::ClientSink;
use crate::core::fatal::report_provider_error;
use crate::core::recognition::handle_recognition;
use crate::core::session::{Session, SessionOptions};
use crate::core::stt::{RecognitionEvent, STTError, STTErrorCallback, STTResultCallback};
use crate::core::synthesis::run_synthesis_queue;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

use super::error::WebSocketResult;
use super::messages::{MessageRoute, OutgoingMessage};
use super::processor::run_inbound_consumer;
use super::sink::{WsClientSink, run_writer};
use super::supervisor::run_recognizer_supervisor;

/// Buffer between session tasks and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Upper bound on flushing queued frames once the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket voice conversation handler
///
/// Session options (`language`, `speaker`, `temperature`, `max_tokens`,
/// `system_prompt`, `knowledge_key`, `model`) are read from the query string.
pub async fn ws_voice_handler(
    ws: WebSocketUpgrade,
    options: Result<Query<SessionOptions>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let Query(options) = options.map_err(|e| AppError::BadRequest(e.body_text()))?;

    info!("WebSocket voice connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_voice_socket(socket, options, state)))
}

async fn handle_voice_socket(socket: WebSocket, options: SessionOptions, app_state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "WebSocket voice connection established");

    let (sender, receiver) = socket.split();
    let (route_tx, route_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let writer = tokio::spawn(run_writer(sender, route_rx, session_id.clone()));
    let sink = Arc::new(WsClientSink::new(route_tx));

    let session = match start_session(&session_id, options, &app_state, sink.clone()).await {
        Ok(session) => session,
        Err(e) => {
            error!(session_id = %session_id, "{}", e);
            let _ = sink
                .send_message(OutgoingMessage::error(e.to_string(), true))
                .await;
            sink.close().await;
            let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await;
            return;
        }
    };

    let settings = session.settings();
    let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(settings.audio_queue_capacity.max(1));
    let (text_tx, text_rx) = mpsc::channel::<String>(settings.text_queue_capacity.max(1));
    tokio::spawn(run_inbound_consumer(session.clone(), audio_rx, text_rx));

    // Give the recognizer a moment to come up before the client starts streaming
    tokio::select! {
        _ = session.scope().cancelled() => {}
        _ = tokio::time::sleep(settings.connect_delay) => {
            session.send(OutgoingMessage::connected()).await;
        }
    }

    read_loop(&session, receiver, audio_tx, text_tx).await;

    cleanup(&session).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!(session_id = %session.id(), "WebSocket writer did not stop in time");
    }

    info!(session_id = %session.id(), "WebSocket voice connection terminated");
}

/// Create the session, wire recognizer callbacks and start its background tasks
async fn start_session(
    session_id: &str,
    options: SessionOptions,
    app_state: &AppState,
    sink: Arc<dyn ClientSink>,
) -> WebSocketResult<Arc<Session>> {
    let providers = app_state.factory.create(&options).await?;
    let (session, queues) = Session::new(
        session_id,
        options,
        app_state.config.pipeline_settings(),
        providers,
        sink,
    );

    let weak = Arc::downgrade(&session);
    session
        .providers()
        .stt
        .init(result_callback(weak.clone()), error_callback(weak))
        .await?;

    tokio::spawn(run_synthesis_queue(session.clone(), queues));
    tokio::spawn(run_recognizer_supervisor(session.clone()));

    Ok(session)
}

fn result_callback(session: Weak<Session>) -> STTResultCallback {
    Arc::new(move |event: RecognitionEvent| {
        let session = session.clone();
        Box::pin(async move {
            if let Some(session) = session.upgrade() {
                handle_recognition(&session, event).await;
            }
        })
    })
}

fn error_callback(session: Weak<Session>) -> STTErrorCallback {
    Arc::new(move |error: STTError| {
        let session = session.clone();
        Box::pin(async move {
            if let Some(session) = session.upgrade() {
                report_provider_error(&session, "ASR", &error.to_string()).await;
            }
        })
    })
}

/// Read frames until the client goes away or the session shuts down
async fn read_loop(
    session: &Arc<Session>,
    mut receiver: SplitStream<WebSocket>,
    audio_tx: mpsc::Sender<Bytes>,
    text_tx: mpsc::Sender<String>,
) {
    loop {
        let message = tokio::select! {
            _ = session.scope().cancelled() => break,
            message = receiver.next() => message,
        };

        match message {
            Some(Ok(message)) => {
                if !dispatch_frame(session, message, &audio_tx, &text_tx) {
                    break;
                }
            }
            None => {
                info!(session_id = %session.id(), "WebSocket connection closed by client");
                break;
            }
            Some(Err(e)) => {
                debug!(session_id = %session.id(), "WebSocket read failed: {}", e);
                break;
            }
        }
    }
}

/// Offer one inbound frame to its queue without waiting.
///
/// A full queue drops the newest frame so a slow recognizer can never stall the socket.
/// Returns `false` once the client asked to close.
pub(super) fn dispatch_frame(
    session: &Session,
    message: Message,
    audio_tx: &mpsc::Sender<Bytes>,
    text_tx: &mpsc::Sender<String>,
) -> bool {
    match message {
        Message::Binary(data) => {
            let size = data.len();
            if audio_tx.try_send(data).is_err() {
                warn!(session_id = %session.id(), size, "Audio queue full, dropping frame");
            }
        }
        Message::Text(text) => {
            if text_tx.try_send(text.as_str().to_owned()).is_err() {
                warn!(session_id = %session.id(), "Text queue full, dropping message");
            }
        }
        Message::Close(_) => {
            info!(session_id = %session.id(), "WebSocket connection closed by client");
            return false;
        }
        _ => {}
    }
    true
}

/// Release everything the session holds
async fn cleanup(session: &Arc<Session>) {
    session.reset();
    session.shutdown();

    let providers = session.providers();
    if let Err(e) = providers.stt.stop_connection().await {
        warn!(session_id = %session.id(), "Failed to stop recognizer: {}", e);
    }
    if let Err(e) = providers.tts.close().await {
        warn!(session_id = %session.id(), "Failed to close synthesizer: {}", e);
    }

    session.sink().close().await;
}
