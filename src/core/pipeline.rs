//! LLM to speech bridge
//!
//! One turn: claim the session's processing flag, cancel the previous turn's synthesis
//! (barge-in), stream the language model reply to the client, and cut the stream into
//! sentences that are queued for synthesis as soon as they are complete.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::events::OutgoingMessage;
use crate::core::fatal::{begin_fatal_shutdown, is_fatal_error};
use crate::core::knowledge::augment_query;
use crate::core::llm::{LLMRequest, LLMSegmentCallback};
use crate::core::session::Session;
use crate::core::synthesis::SynthesisTask;
use crate::core::text::{split_first_sentence, strip_pictographs};

const DEFAULT_LENGTH_PROMPT: &str = "Answer the user's question concisely.";

/// Start a turn for `text` on a background task
pub fn spawn_turn(session: &Arc<Session>, text: String) {
    tokio::spawn(run_turn(session.clone(), text));
}

/// Releases this turn's processing claim when the turn ends
struct ProcessingGuard<'a> {
    session: &'a Session,
    ticket: u64,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.session.state().finish_processing(self.ticket);
    }
}

/// Run one conversational turn to completion
pub async fn run_turn(session: Arc<Session>, text: String) {
    let (turn, ticket) = {
        let mut state = session.state();
        let Some(ticket) = state.try_begin_processing(&text) else {
            debug!(session_id = %session.id(), text = %text, "Turn skipped");
            return;
        };
        (state.start_turn(session.scope()), ticket)
    };
    let _processing = ProcessingGuard {
        session: &session,
        ticket,
    };

    info!(session_id = %session.id(), text = %text, "Starting turn");

    let request = build_request(&session, &text).await;
    let reply = Arc::new(Mutex::new(ReplyBuffer::default()));
    let on_segment = segment_handler(&session, &turn, reply.clone());
    let llm = session.providers().llm.clone();

    match llm.stream_query(turn.clone(), request, on_segment).await {
        Ok(response) => {
            let remaining = {
                let mut reply = reply.lock();
                if reply.segments_seen {
                    reply.take_remaining()
                } else {
                    warn!(
                        session_id = %session.id(),
                        "LLM stream delivered no segments, speaking final response"
                    );
                    Some(strip_pictographs(&response)).filter(|t| !t.is_empty())
                }
            };

            if let Some(remaining) = remaining {
                enqueue_with_retry(&session, &turn, remaining).await;
            }
            debug!(session_id = %session.id(), "LLM stream finished");
        }
        Err(_) if turn.is_cancelled() => {
            debug!(session_id = %session.id(), "LLM stream cancelled");
        }
        Err(e) => {
            let detail = e.to_string();
            if is_fatal_error(&detail) {
                begin_fatal_shutdown(&session, "LLM", &detail);
            } else {
                error!(session_id = %session.id(), "LLM stream failed: {}", detail);
                session
                    .send(OutgoingMessage::error(
                        format!("LLM processing failed: {detail}"),
                        false,
                    ))
                    .await;
            }
            turn.cancel();
        }
    }
}

/// Sentence buffer for one streamed reply
#[derive(Debug, Default)]
struct ReplyBuffer {
    full: String,
    pending: String,
    segments_seen: bool,
    sentences_detected: usize,
    flushed: bool,
}

impl ReplyBuffer {
    /// Append a segment and return every sentence it completed, ready to speak
    fn push(&mut self, segment: &str) -> Vec<String> {
        self.segments_seen = true;
        self.full.push_str(segment);
        self.pending.push_str(segment);

        let mut sentences = Vec::new();
        while let Some((sentence, rest)) = split_first_sentence(&self.pending) {
            self.sentences_detected += 1;
            let speakable = strip_pictographs(sentence);
            let rest = rest.to_string();
            self.pending = rest;
            if !speakable.is_empty() {
                sentences.push(speakable);
            }
        }
        sentences
    }

    /// Text left over once the stream completes, at most once per reply
    fn take_remaining(&mut self) -> Option<String> {
        if self.flushed {
            return None;
        }
        self.flushed = true;

        let raw = if !self.pending.is_empty() {
            std::mem::take(&mut self.pending)
        } else if self.sentences_detected == 0 {
            self.full.clone()
        } else {
            return None;
        };

        Some(strip_pictographs(&raw)).filter(|t| !t.is_empty())
    }
}

fn segment_handler(
    session: &Arc<Session>,
    turn: &CancellationToken,
    reply: Arc<Mutex<ReplyBuffer>>,
) -> LLMSegmentCallback {
    let session = session.clone();
    let turn = turn.clone();

    Arc::new(move |segment: String, is_complete: bool| {
        let session = session.clone();
        let turn = turn.clone();
        let reply = reply.clone();

        Box::pin(async move {
            if turn.is_cancelled() {
                return;
            }

            let (sentences, remaining) = {
                let mut reply = reply.lock();
                let sentences = reply.push(&segment);
                let remaining = if is_complete {
                    reply.take_remaining()
                } else {
                    None
                };
                (sentences, remaining)
            };

            if !segment.is_empty() {
                session
                    .send(OutgoingMessage::LlmResponse { text: segment })
                    .await;
            }

            for sentence in sentences.into_iter().chain(remaining) {
                enqueue_with_retry(&session, &turn, sentence).await;
            }
        })
    })
}

/// Queue a sentence for synthesis under a child scope of `turn`.
///
/// A full queue is retried a few times; after that the sentence is dropped rather than
/// stalling the LLM stream.
async fn enqueue_with_retry(session: &Arc<Session>, turn: &CancellationToken, text: String) -> bool {
    let settings = session.settings();
    let attempts = settings.enqueue_retries.max(1);
    let mut task = SynthesisTask {
        text,
        scope: turn.child_token(),
        sink: session.sink().clone(),
    };

    for attempt in 1..=attempts {
        if turn.is_cancelled() {
            return false;
        }

        match session.try_enqueue(task) {
            Ok(()) => return true,
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %session.id(), "Synthesis queue closed");
                return false;
            }
            Err(TrySendError::Full(returned)) => {
                task = returned;
                warn!(
                    session_id = %session.id(),
                    attempt,
                    "Synthesis queue full, retrying"
                );
                if attempt < attempts {
                    tokio::select! {
                        _ = tokio::time::sleep(settings.enqueue_retry_delay) => {}
                        _ = turn.cancelled() => return false,
                    }
                }
            }
        }
    }

    error!(
        session_id = %session.id(),
        text = %task.text,
        "Dropping sentence after {} enqueue attempts",
        attempts
    );
    false
}

/// Build the LLM request for `text`, with knowledge-base context when configured
async fn build_request(session: &Session, text: &str) -> LLMRequest {
    let settings = session.settings();
    let options = session.options();
    let mut question = text.to_string();

    if let (Some(key), Some(knowledge)) = (options.knowledge_key(), &session.providers().knowledge)
    {
        match knowledge.search(key, text, settings.knowledge_top_k).await {
            Ok(passages) if !passages.is_empty() => {
                info!(
                    session_id = %session.id(),
                    key,
                    count = passages.len(),
                    "Retrieved knowledge passages"
                );
                question = augment_query(text, &passages);
            }
            Ok(_) => {}
            Err(e) => warn!(session_id = %session.id(), "Knowledge search failed: {}", e),
        }
    }

    let max_tokens = options.max_tokens(settings);

    LLMRequest {
        model: options.model(settings).to_string(),
        query: compose_query(options.system_prompt(), max_tokens, &question),
        temperature: options.temperature(settings),
        max_tokens,
    }
}

/// Prefix the question with the system prompt and, when output is capped, a length hint
fn compose_query(system_prompt: Option<&str>, max_tokens: Option<u32>, question: &str) -> String {
    let mut prompt = system_prompt.map(str::to_string);

    if let Some(max_tokens) = max_tokens {
        let guidance = format!(
            "\n\nImportant: your reply is limited to about {} characters. \
             Make sure the answer is complete within that limit.",
            max_tokens as u64 * 3 / 2
        );
        let base = prompt.take().unwrap_or_else(|| DEFAULT_LENGTH_PROMPT.to_string());
        prompt = Some(base + &guidance);
    }

    match prompt {
        Some(prompt) => format!("{prompt}\n\nQuestion: {question}"),
        None => question.to_string(),
    }
}
