//! Ordered, cancellable speech synthesis
//!
//! The text pipeline enqueues [`SynthesisTask`]s; [`run_synthesis_queue`] drains them
//! in FIFO order. Each task is synthesized on its own spawned task so a slow provider
//! never blocks the queue loop, but the loop will not start task N+1 until task N has
//! signalled completion (or the configured timeout elapses). The signal is sent from a
//! drop guard, so it fires on every exit path including cancellation and panics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::events::{ClientSink, OutgoingMessage};
use crate::core::fatal::{begin_fatal_shutdown, is_fatal_error};
use crate::core::session::{Session, SessionQueues};
use crate::core::tts::{AudioFormat, TTSAudioCallback, TTSError};

const PLAYBACK_MARGIN: f64 = 1.05;
const FALLBACK_MS_PER_CHAR: u64 = 450;
const MIN_PLAYBACK: Duration = Duration::from_millis(250);
const MAX_PLAYBACK: Duration = Duration::from_secs(8);

/// One span of reply text waiting to be spoken
#[derive(Clone)]
pub struct SynthesisTask {
    pub text: String,
    /// Child of the turn scope; cancelled on barge-in or session reset
    pub scope: CancellationToken,
    pub sink: Arc<dyn ClientSink>,
}

impl std::fmt::Debug for SynthesisTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisTask")
            .field("text", &self.text)
            .field("cancelled", &self.scope.is_cancelled())
            .finish()
    }
}

/// Estimated client-side playback time for `bytes` of synthesized audio.
///
/// Falls back to a per-character estimate when the format carries no byte rate.
pub fn playback_duration(bytes: u64, format: &AudioFormat, text: &str) -> Duration {
    let byte_rate = format.byte_rate();
    let estimate = if byte_rate > 0 {
        Duration::from_secs_f64(bytes as f64 / byte_rate as f64 * PLAYBACK_MARGIN)
    } else {
        Duration::from_millis(text.chars().count() as u64 * FALLBACK_MS_PER_CHAR)
    };

    estimate.clamp(MIN_PLAYBACK, MAX_PLAYBACK)
}

/// Sends the one-slot completion signal when dropped
struct CompletionGuard {
    signal: mpsc::Sender<()>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // A full slot already wakes the waiter
        let _ = self.signal.try_send(());
    }
}

/// Drain the session's synthesis queue until the session shuts down
pub async fn run_synthesis_queue(session: Arc<Session>, queues: SessionQueues) {
    let SessionQueues {
        mut tasks,
        mut completions,
    } = queues;
    let timeout = session.settings().task_timeout;
    let mut awaiting_completion = false;

    debug!(session_id = %session.id(), "Synthesis queue started");

    loop {
        let task = tokio::select! {
            _ = session.scope().cancelled() => break,
            task = tasks.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        if task.text.is_empty() || task.scope.is_cancelled() {
            debug!(session_id = %session.id(), "Skipping cancelled synthesis task");
            continue;
        }

        if awaiting_completion {
            tokio::select! {
                _ = session.scope().cancelled() => break,
                signal = tokio::time::timeout(timeout, completions.recv()) => match signal {
                    Ok(Some(())) => {}
                    Ok(None) => break,
                    Err(_) => warn!(
                        session_id = %session.id(),
                        "Previous synthesis task did not finish within {:?}, starting next task",
                        timeout
                    ),
                },
            }
            awaiting_completion = false;

            if task.scope.is_cancelled() {
                debug!(session_id = %session.id(), "Synthesis task cancelled while waiting");
                continue;
            }
        }

        awaiting_completion = true;
        let guard = CompletionGuard {
            signal: session.completion_signal(),
        };
        tokio::spawn(synthesize_task(session.clone(), task, guard));
    }

    debug!(session_id = %session.id(), "Synthesis queue stopped");
}

enum SynthesisOutcome {
    Completed,
    Cancelled,
    NoAudio,
    Failed(TTSError),
    Fatal(TTSError),
    SinkClosed,
}

async fn synthesize_task(session: Arc<Session>, task: SynthesisTask, guard: CompletionGuard) {
    let tts = session.providers().tts.clone();
    let format = tts.format();
    let bytes_sent = Arc::new(AtomicU64::new(0));

    session.set_synthesis_audible(true);

    let outcome = if task
        .sink
        .send_message(OutgoingMessage::TtsStart { format })
        .await
        .is_err()
    {
        SynthesisOutcome::SinkClosed
    } else {
        info!(
            session_id = %session.id(),
            provider = tts.provider(),
            text = %task.text,
            "Starting synthesis"
        );

        let on_audio = audio_forwarder(&session, &task, bytes_sent.clone());
        match tts.synthesize(task.scope.clone(), &task.text, on_audio).await {
            _ if task.scope.is_cancelled() => SynthesisOutcome::Cancelled,
            Err(e) if is_fatal_error(&e.to_string()) => SynthesisOutcome::Fatal(e),
            Err(e) => SynthesisOutcome::Failed(e),
            Ok(()) if bytes_sent.load(Ordering::Acquire) == 0 => SynthesisOutcome::NoAudio,
            Ok(()) => SynthesisOutcome::Completed,
        }
    };

    let bytes = bytes_sent.load(Ordering::Acquire);
    match &outcome {
        SynthesisOutcome::Fatal(e) => begin_fatal_shutdown(&session, "TTS", &e.to_string()),
        SynthesisOutcome::Failed(e) => {
            error!(session_id = %session.id(), "Synthesis failed: {}", e);
            session
                .send(OutgoingMessage::error(format!("TTS synthesis failed: {e}"), false))
                .await;
        }
        SynthesisOutcome::NoAudio => {
            warn!(session_id = %session.id(), text = %task.text, "Synthesis produced no audio");
            session
                .send(OutgoingMessage::error(
                    "TTS synthesis failed: no audio generated",
                    false,
                ))
                .await;
        }
        SynthesisOutcome::Cancelled => {
            debug!(session_id = %session.id(), bytes, "Synthesis cancelled");
        }
        SynthesisOutcome::Completed | SynthesisOutcome::SinkClosed => {}
    }

    // Once fatal, the warning clip owns the client's playback and the audible gate
    let fatal = session.is_fatal();
    if !fatal && !matches!(outcome, SynthesisOutcome::Fatal(_) | SynthesisOutcome::SinkClosed) {
        session.send(OutgoingMessage::TtsEnd).await;
    }

    if matches!(outcome, SynthesisOutcome::Completed) {
        let pace = playback_duration(bytes, &format, &task.text);
        info!(
            session_id = %session.id(),
            bytes,
            "Synthesis complete, waiting {:?} for playback",
            pace
        );
        tokio::select! {
            _ = tokio::time::sleep(pace) => {}
            _ = task.scope.cancelled() => {}
        }
    }

    if !session.is_fatal() {
        session.set_synthesis_audible(false);
        restart_idle_recognizer(&session).await;
    }
    drop(guard);
}

/// Build the chunk callback that forwards provider audio to the client
fn audio_forwarder(
    session: &Arc<Session>,
    task: &SynthesisTask,
    bytes_sent: Arc<AtomicU64>,
) -> TTSAudioCallback {
    let session_id = session.id().to_string();
    let recognized_at = session.state().recognized_at();
    let chunk_size = session.settings().audio_chunk_size.max(1);
    let first_chunk = Arc::new(AtomicBool::new(true));
    let scope = task.scope.clone();
    let sink = task.sink.clone();
    let text = task.text.clone();

    Arc::new(move |audio: Bytes| {
        let session_id = session_id.clone();
        let first_chunk = first_chunk.clone();
        let bytes_sent = bytes_sent.clone();
        let scope = scope.clone();
        let sink = sink.clone();
        let text = text.clone();

        Box::pin(async move {
            if scope.is_cancelled() || audio.is_empty() {
                return;
            }

            if first_chunk.swap(false, Ordering::AcqRel)
                && let Some(recognized_at) = recognized_at
            {
                info!(
                    session_id = %session_id,
                    text = %text,
                    latency_ms = recognized_at.elapsed().as_millis() as u64,
                    "First synthesized audio after recognition"
                );
            }

            bytes_sent.fetch_add(audio.len() as u64, Ordering::AcqRel);

            let mut offset = 0;
            while offset < audio.len() {
                if scope.is_cancelled() {
                    return;
                }
                let end = (offset + chunk_size).min(audio.len());
                if let Err(e) = sink.send_audio(audio.slice(offset..end)).await {
                    debug!(session_id = %session_id, "Stopping audio forwarding: {}", e);
                    return;
                }
                offset = end;
            }
        })
    })
}

/// Stop a recognizer that went idle during playback so the supervisor reconnects it
async fn restart_idle_recognizer(session: &Arc<Session>) {
    let stt = &session.providers().stt;
    if session.is_shut_down() || session.is_fatal() || stt.is_active() {
        return;
    }

    warn!(session_id = %session.id(), "Recognizer went idle during playback, restarting");
    if let Err(e) = stt.stop_connection().await {
        warn!(session_id = %session.id(), "Failed to stop recognizer: {}", e);
    }
    session.request_recognizer_restart();
}
