//! Voice session: one per client connection
//!
//! A [`Session`] owns the provider handles, the mutable [`SessionState`], the write
//! side of the client connection and the session-wide cancellation scope. Every task
//! spawned for the connection holds an `Arc<Session>`; provider callbacks hold a
//! `Weak<Session>` so the session can be dropped once the connection ends.
//!
//! The synthesis queue and its completion signal are bounded channels created with
//! the session. Their receivers are handed out once, through [`SessionQueues`], to the
//! synthesis queue processor.

mod config;
mod state;

pub use config::{
    DEFAULT_LLM_MODEL, DEFAULT_TEMPERATURE, DEFAULT_WARNING_CLIP, PipelineSettings,
    SessionOptions,
};
pub use state::{SAME_UTTERANCE_THRESHOLD, SessionState};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::events::{ClientSink, OutgoingMessage};
use crate::core::providers::SessionProviders;
use crate::core::synthesis::SynthesisTask;

/// Receiving ends of a session's synthesis queue
pub struct SessionQueues {
    pub tasks: mpsc::Receiver<SynthesisTask>,
    pub completions: mpsc::Receiver<()>,
}

pub struct Session {
    id: String,
    options: SessionOptions,
    settings: PipelineSettings,
    providers: SessionProviders,
    sink: Arc<dyn ClientSink>,
    state: Mutex<SessionState>,
    scope: CancellationToken,
    /// Recognizer connection is up and accepting audio
    active: AtomicBool,
    restart: Notify,
    tasks: mpsc::Sender<SynthesisTask>,
    completions: mpsc::Sender<()>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        options: SessionOptions,
        settings: PipelineSettings,
        providers: SessionProviders,
        sink: Arc<dyn ClientSink>,
    ) -> (Arc<Self>, SessionQueues) {
        let (tasks_tx, tasks_rx) = mpsc::channel(settings.tts_queue_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::channel(1);

        let session = Arc::new(Self {
            id: id.into(),
            options,
            settings,
            providers,
            sink,
            state: Mutex::new(SessionState::new()),
            scope: CancellationToken::new(),
            active: AtomicBool::new(false),
            restart: Notify::new(),
            tasks: tasks_tx,
            completions: completions_tx,
        });

        let queues = SessionQueues {
            tasks: tasks_rx,
            completions: completions_rx,
        };

        (session, queues)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn providers(&self) -> &SessionProviders {
        &self.providers
    }

    pub fn sink(&self) -> &Arc<dyn ClientSink> {
        &self.sink
    }

    /// Session-wide cancellation scope. Every turn scope is a child of it.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Lock the session state. Never hold the guard across an await.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Mark the recognizer inactive and wake the supervisor to reconnect it
    pub fn request_recognizer_restart(&self) {
        self.set_active(false);
        self.restart.notify_one();
    }

    /// Resolves once [`Session::request_recognizer_restart`] has been called
    pub async fn recognizer_restart_requested(&self) {
        self.restart.notified().await;
    }

    pub fn is_fatal(&self) -> bool {
        self.state().is_fatal()
    }

    pub fn is_synthesis_audible(&self) -> bool {
        self.state().is_synthesis_audible()
    }

    pub fn set_synthesis_audible(&self, audible: bool) {
        self.state().set_synthesis_audible(audible);
    }

    /// Offer a task to the synthesis queue without waiting
    pub fn try_enqueue(
        &self,
        task: SynthesisTask,
    ) -> Result<(), mpsc::error::TrySendError<SynthesisTask>> {
        self.tasks.try_send(task)
    }

    /// Sender for the one-slot "task finished" signal
    pub fn completion_signal(&self) -> mpsc::Sender<()> {
        self.completions.clone()
    }

    /// Send a control frame, logging instead of failing when the client is gone
    pub async fn send(&self, message: OutgoingMessage) {
        if let Err(e) = self.sink.send_message(message).await {
            debug!(session_id = %self.id, "Dropping outgoing message: {}", e);
        }
    }

    /// Forget all conversation state and cancel in-flight synthesis.
    ///
    /// Tasks still queued belong to the cancelled turn and are skipped when dequeued.
    pub fn reset(&self) {
        self.state().clear();
    }

    /// Tear down the session, cancelling every turn and background task
    pub fn shutdown(&self) {
        self.scope.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.scope.is_cancelled()
    }
}
