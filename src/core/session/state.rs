//! Mutable per-session recognition and playback state
//!
//! [`SessionState`] is always accessed through the session's mutex. Its methods are
//! synchronous so the lock is never held across an await point.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::core::text::{normalize, normalized_prefix_end, similarity};

/// Similarity above which two recognizer hypotheses are the same utterance
pub const SAME_UTTERANCE_THRESHOLD: f64 = 0.85;

#[derive(Debug, Default)]
pub struct SessionState {
    /// Latest raw recognizer text
    last_text: String,
    /// Last increment handed to the text pipeline
    last_processed_text: String,
    /// Last increment shown to the client
    last_sent_text: String,
    /// Cumulative recognizer text already consumed downstream
    last_processed_cumulative: String,
    /// Ticket of the turn holding the pipeline
    processing: Option<u64>,
    /// Next processing ticket; survives [`SessionState::clear`]
    next_ticket: u64,
    synthesis_audible: bool,
    fatal_error: bool,
    /// Cancellation scope of the current turn's synthesis
    turn_scope: Option<CancellationToken>,
    /// When the current turn's text was handed to the pipeline
    recognized_at: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    pub fn set_last_text(&mut self, text: &str) {
        self.last_text = text.to_string();
    }

    pub fn last_sent_text(&self) -> &str {
        &self.last_sent_text
    }

    pub fn set_last_sent_text(&mut self, text: &str) {
        self.last_sent_text = text.to_string();
    }

    pub fn last_processed_cumulative(&self) -> &str {
        &self.last_processed_cumulative
    }

    pub fn set_last_processed_cumulative(&mut self, text: &str) {
        self.last_processed_cumulative = text.to_string();
    }

    /// Whether `text` is exactly the last increment handed to the pipeline
    pub fn is_processed(&self, text: &str) -> bool {
        text == self.last_processed_text
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_some()
    }

    /// Claim the pipeline for `text`.
    ///
    /// Fails when a fatal error is in progress, another turn is still generating, or
    /// `text` was already processed. On success the text is recorded as processed and
    /// the returned ticket holds the pipeline until it is passed to
    /// [`SessionState::finish_processing`].
    pub fn try_begin_processing(&mut self, text: &str) -> Option<u64> {
        if self.fatal_error || self.processing.is_some() || self.is_processed(text) {
            return None;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        self.last_text = text.to_string();
        self.last_processed_text = text.to_string();
        self.processing = Some(ticket);
        self.recognized_at = Some(Instant::now());
        Some(ticket)
    }

    /// Release the pipeline if `ticket` still holds it.
    ///
    /// A turn that outlives a reset must not release the claim of a turn started after it.
    pub fn finish_processing(&mut self, ticket: u64) {
        if self.processing == Some(ticket) {
            self.processing = None;
        }
    }

    pub fn recognized_at(&self) -> Option<Instant> {
        self.recognized_at
    }

    pub fn is_synthesis_audible(&self) -> bool {
        self.synthesis_audible
    }

    pub fn set_synthesis_audible(&mut self, audible: bool) {
        self.synthesis_audible = audible;
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_error
    }

    /// Enter fatal shutdown. Also marks synthesis audible so microphone audio stops
    /// flowing to the recognizer.
    pub fn mark_fatal(&mut self) {
        self.fatal_error = true;
        self.synthesis_audible = true;
    }

    /// Cancel the previous turn and open a new turn scope under `session_scope`
    pub fn start_turn(&mut self, session_scope: &CancellationToken) -> CancellationToken {
        self.cancel_turn();
        let scope = session_scope.child_token();
        self.turn_scope = Some(scope.clone());
        scope
    }

    /// Cancel the current turn's synthesis, if any
    pub fn cancel_turn(&mut self) {
        if let Some(scope) = self.turn_scope.take() {
            scope.cancel();
        }
    }

    /// Reset everything to a fresh session. Cancels in-flight synthesis.
    ///
    /// A fatal shutdown in progress and the ticket counter survive the reset.
    pub fn clear(&mut self) {
        self.cancel_turn();
        let fatal_error = self.fatal_error;
        let next_ticket = self.next_ticket;
        *self = Self::default();
        self.fatal_error = fatal_error;
        self.next_ticket = next_ticket;
    }

    /// Extract the part of `cumulative` not yet processed.
    ///
    /// Returns an empty string when the text is a restatement, a stutter, or only
    /// punctuation on top of what was already processed.
    pub fn extract_increment(&self, cumulative: &str) -> String {
        let last = self.last_processed_cumulative.as_str();
        if last.is_empty() {
            return cumulative.to_string();
        }

        let normalized_last = normalize(last);

        if cumulative.len() > last.len()
            && let Some(rest) = cumulative.strip_prefix(last)
        {
            return Self::remainder_increment(rest, &normalized_last);
        }

        let normalized_current = normalize(cumulative);

        if normalized_current == normalized_last
            || similarity(&normalized_current, &normalized_last) > SAME_UTTERANCE_THRESHOLD
        {
            return String::new();
        }

        // Revised punctuation around the same leading words, e.g. "你好。" then "你好，…"
        if normalized_current.len() > normalized_last.len()
            && !normalized_last.is_empty()
            && let Some(end) = normalized_prefix_end(cumulative, &normalized_last)
        {
            return Self::remainder_increment(&cumulative[end..], &normalized_last);
        }

        cumulative.to_string()
    }

    fn remainder_increment(rest: &str, normalized_last: &str) -> String {
        let normalized_rest = normalize(rest);
        if normalized_rest.is_empty() {
            return String::new();
        }

        let is_short = normalized_rest.chars().count() < normalized_last.chars().count() / 2;
        if is_short && similarity(&normalized_rest, normalized_last) > SAME_UTTERANCE_THRESHOLD {
            return String::new();
        }

        rest.trim().to_string()
    }
}
