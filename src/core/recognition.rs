//! Recognition result routing
//!
//! Streaming recognizers keep re-emitting revised hypotheses of the same utterance.
//! The router decides, per event, whether anything new was said and hands only the
//! unseen, filtered increment to the text pipeline.
//!
//! - Interim text without a terminal mark is recorded and nothing else.
//! - Interim text with a terminal mark is a sentence boundary: extract, filter, forward.
//! - Final text repeats the boundary sequence, but always records the cumulative text
//!   as processed so a stuck hypothesis cannot block later turns.
//!
//! Cumulative text survives final results; only a session reset clears it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::events::OutgoingMessage;
use crate::core::pipeline;
use crate::core::session::{Session, SessionState};
use crate::core::stt::RecognitionEvent;
use crate::core::text::{filter_recognized, is_complete_sentence};
use crate::core::usage::UsageRecord;

/// What the router did with one recognizer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Fatal shutdown in progress or empty text
    Ignored,
    /// Live partial, recorded only
    Accumulated,
    /// Nothing new after dedup and filtering
    Suppressed,
    /// New text for the client and the text pipeline
    Forward(String),
}

/// Fold one recognizer event into the session state
pub fn route_event(state: &mut SessionState, text: &str, is_final: bool) -> Routing {
    if state.is_fatal() || text.is_empty() {
        return Routing::Ignored;
    }

    if is_final {
        return route_final(state, text);
    }

    state.set_last_text(text);
    if !is_complete_sentence(text) {
        return Routing::Accumulated;
    }

    let increment = state.extract_increment(text);
    if increment.is_empty() {
        return Routing::Suppressed;
    }

    state.set_last_processed_cumulative(text);
    forward_filtered(state, &increment)
}

fn route_final(state: &mut SessionState, text: &str) -> Routing {
    if state.is_processed(text) {
        return Routing::Suppressed;
    }

    let increment = state.extract_increment(text);
    state.set_last_processed_cumulative(text);
    if increment.is_empty() {
        return Routing::Suppressed;
    }

    forward_filtered(state, &increment)
}

fn forward_filtered(state: &mut SessionState, increment: &str) -> Routing {
    let filtered = filter_recognized(increment);
    if filtered.is_empty() {
        return Routing::Suppressed;
    }

    state.set_last_sent_text(&filtered);
    Routing::Forward(filtered)
}

/// Handle a recognizer result callback for `session`
pub async fn handle_recognition(session: &Arc<Session>, event: RecognitionEvent) {
    if event.is_final && !event.duration.is_zero() && session.settings().record_usage {
        record_usage(session, &event);
    }

    let routing = {
        let mut state = session.state();
        route_event(&mut state, &event.text, event.is_final)
    };

    match routing {
        Routing::Forward(text) => {
            debug!(session_id = %session.id(), text = %text, "Forwarding recognized text");
            session
                .send(OutgoingMessage::AsrResult { text: text.clone() })
                .await;
            pipeline::spawn_turn(session, text);
        }
        other => {
            debug!(
                session_id = %session.id(),
                text = %event.text,
                is_final = event.is_final,
                "Recognition event not forwarded: {:?}",
                other
            );
        }
    }
}

/// Submit a usage record without waiting for the sink
fn record_usage(session: &Arc<Session>, event: &RecognitionEvent) {
    let Some(sink) = session.providers().usage.clone() else {
        return;
    };

    let record = UsageRecord::for_recognition(
        session.id(),
        &event.correlation_id,
        event.duration.as_secs_f64(),
    );
    let session_id = session.id().to_string();

    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            warn!(session_id = %session_id, "Failed to record recognition usage: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_without_terminal_mark_accumulates() {
        let mut state = SessionState::new();
        assert_eq!(route_event(&mut state, "你", false), Routing::Accumulated);
        assert_eq!(state.last_text(), "你");
        assert_eq!(state.last_processed_cumulative(), "");
    }

    #[test]
    fn test_sentence_boundary_forwards_increment() {
        let mut state = SessionState::new();
        assert_eq!(
            route_event(&mut state, "你好。", false),
            Routing::Forward("你好。".to_string())
        );
        assert_eq!(state.last_processed_cumulative(), "你好。");
        assert_eq!(state.last_sent_text(), "你好。");
    }

    #[test]
    fn test_filler_boundary_is_consumed_silently() {
        let mut state = SessionState::new();
        assert_eq!(route_event(&mut state, "嗯。", false), Routing::Suppressed);
        assert_eq!(state.last_processed_cumulative(), "嗯。");
        assert_eq!(state.last_sent_text(), "");
    }

    #[test]
    fn test_duplicate_final_is_suppressed() {
        let mut state = SessionState::new();
        let first = route_event(&mut state, "今天天气怎么样", true);
        assert_eq!(first, Routing::Forward("今天天气怎么样".to_string()));
        assert_eq!(
            route_event(&mut state, "今天天气怎么样", true),
            Routing::Suppressed
        );
    }

    #[test]
    fn test_final_after_boundary_forwards_only_suffix() {
        let mut state = SessionState::new();
        route_event(&mut state, "你", false);
        route_event(&mut state, "你好。", false);

        assert_eq!(
            route_event(&mut state, "你好，今天天气怎么样", true),
            Routing::Forward("，今天天气怎么样".to_string())
        );
        assert_eq!(state.last_processed_cumulative(), "你好，今天天气怎么样");
    }

    #[test]
    fn test_revised_boundary_with_short_tail_is_not_forwarded_again() {
        let mut state = SessionState::new();
        assert_eq!(
            route_event(&mut state, "我想订一张明天去北京的票。", false),
            Routing::Forward("我想订一张明天去北京的票。".to_string())
        );

        assert_eq!(
            route_event(&mut state, "我想订一张明天去北京的票，好吗", true),
            Routing::Suppressed
        );
        assert_eq!(
            state.last_processed_cumulative(),
            "我想订一张明天去北京的票，好吗"
        );
    }

    #[test]
    fn test_final_restatement_still_marks_cumulative() {
        let mut state = SessionState::new();
        route_event(&mut state, "喂喂可以听到吗？", false);

        assert_eq!(
            route_event(&mut state, "喂喂喂可以听到吗", true),
            Routing::Suppressed
        );
        assert_eq!(state.last_processed_cumulative(), "喂喂喂可以听到吗");
    }

    #[test]
    fn test_fatal_session_ignores_events() {
        let mut state = SessionState::new();
        state.mark_fatal();
        assert_eq!(route_event(&mut state, "你好。", false), Routing::Ignored);
        assert_eq!(route_event(&mut state, "", true), Routing::Ignored);
    }
}
