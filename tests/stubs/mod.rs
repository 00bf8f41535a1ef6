//! Stub collaborators shared by the integration tests
//!
//! Every stub counts its calls with atomics and records what it was asked to do, so
//! tests can assert on ordering and cancellation without a real provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use vocalis::core::events::{ClientSink, OutgoingMessage, SinkError};
use vocalis::core::knowledge::{KnowledgeBase, KnowledgeError, KnowledgePassage};
use vocalis::core::llm::{BaseLLM, LLMError, LLMRequest, LLMSegmentCallback};
use vocalis::core::providers::{ProviderError, ProviderFactory, SessionProviders};
use vocalis::core::session::{PipelineSettings, Session, SessionOptions, SessionQueues};
use vocalis::core::stt::{
    BaseSTT, RecognitionEvent, STTError, STTErrorCallback, STTResultCallback,
};
use vocalis::core::tts::{AudioFormat, BaseTTS, TTSAudioCallback, TTSError};
use vocalis::core::usage::{UsageError, UsageRecord, UsageSink};

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Client sink
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Message(OutgoingMessage),
    Audio(usize),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Message(message) => Some(message.clone()),
                SinkEvent::Audio(_) => None,
            })
            .collect()
    }

    pub fn asr_results(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                OutgoingMessage::AsrResult { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&OutgoingMessage) -> bool) -> usize {
        self.messages().iter().filter(|m| matches(m)).count()
    }

    pub fn audio_bytes(&self) -> usize {
        self.events
            .lock()
            .iter()
            .map(|event| match event {
                SinkEvent::Audio(len) => *len,
                SinkEvent::Message(_) => 0,
            })
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.events.lock().push(SinkEvent::Message(message));
        Ok(())
    }

    async fn send_audio(&self, audio: Bytes) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.events.lock().push(SinkEvent::Audio(audio.len()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Recognizer
// ============================================================================

#[derive(Default)]
pub struct StubSTT {
    on_result: Mutex<Option<STTResultCallback>>,
    on_error: Mutex<Option<STTErrorCallback>>,
    active: AtomicBool,
    pub connects: AtomicUsize,
    pub stops: AtomicUsize,
    pub audio_frames: AtomicUsize,
    /// Error message returned by every `connect`, when set
    pub connect_error: Mutex<Option<String>>,
}

impl StubSTT {
    /// Deliver a recognition result as the provider would
    pub async fn emit(&self, event: RecognitionEvent) {
        let callback = self.on_result.lock().clone();
        if let Some(callback) = callback {
            callback(event).await;
        }
    }

    /// Deliver an asynchronous provider error
    pub async fn fail(&self, error: STTError) {
        let callback = self.on_error.lock().clone();
        if let Some(callback) = callback {
            callback(error).await;
        }
    }

    /// Connection state as seen by the session, without going through the trait
    pub fn is_active_now(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn mark_connected(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Drop the connection without reporting an error
    pub fn drop_connection(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BaseSTT for StubSTT {
    async fn init(
        &self,
        on_result: STTResultCallback,
        on_error: STTErrorCallback,
    ) -> Result<(), STTError> {
        *self.on_result.lock() = Some(on_result);
        *self.on_error.lock() = Some(on_error);
        Ok(())
    }

    async fn connect(&self) -> Result<(), STTError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.connect_error.lock().clone() {
            return Err(STTError::ConnectionFailed(message));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_connection(&self) -> Result<(), STTError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn send_audio(&self, _audio: Bytes) -> Result<(), STTError> {
        self.audio_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "stub-stt"
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

/// One `synthesize` call as observed by the stub
#[derive(Debug, Clone)]
pub struct SynthesisRecord {
    pub text: String,
    pub started: Instant,
    pub finished: Option<Instant>,
    pub cancelled: bool,
}

pub struct StubTTS {
    pub format: AudioFormat,
    pub chunks: usize,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    /// Error message returned for any text containing the key
    pub failures: HashMap<String, String>,
    pub records: Mutex<Vec<SynthesisRecord>>,
    pub closes: AtomicUsize,
}

impl Default for StubTTS {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            chunks: 3,
            chunk_size: 3200,
            chunk_delay: Duration::from_millis(50),
            failures: HashMap::new(),
            records: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }
}

impl StubTTS {
    pub fn failing(key: &str, message: &str) -> Self {
        let mut tts = Self::default();
        tts.failures.insert(key.to_string(), message.to_string());
        tts
    }

    pub fn records(&self) -> Vec<SynthesisRecord> {
        self.records.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.text).collect()
    }
}

#[async_trait]
impl BaseTTS for StubTTS {
    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn synthesize(
        &self,
        scope: CancellationToken,
        text: &str,
        on_audio: TTSAudioCallback,
    ) -> Result<(), TTSError> {
        let index = {
            let mut records = self.records.lock();
            records.push(SynthesisRecord {
                text: text.to_string(),
                started: Instant::now(),
                finished: None,
                cancelled: false,
            });
            records.len() - 1
        };

        if let Some((_, message)) = self.failures.iter().find(|(key, _)| text.contains(key.as_str()))
        {
            self.records.lock()[index].finished = Some(Instant::now());
            return Err(TTSError::ProviderError(message.clone()));
        }

        for _ in 0..self.chunks {
            tokio::select! {
                _ = scope.cancelled() => {
                    let mut records = self.records.lock();
                    records[index].cancelled = true;
                    records[index].finished = Some(Instant::now());
                    return Err(TTSError::Cancelled);
                }
                _ = tokio::time::sleep(self.chunk_delay) => {}
            }
            on_audio(Bytes::from(vec![0u8; self.chunk_size])).await;
        }

        self.records.lock()[index].finished = Some(Instant::now());
        Ok(())
    }

    async fn close(&self) -> Result<(), TTSError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "stub-tts"
    }
}

// ============================================================================
// Language model
// ============================================================================

/// Streams scripted segments for queries containing a key
#[derive(Default)]
pub struct StubLLM {
    pub replies: Mutex<Vec<(String, Vec<String>)>>,
    /// Error message returned for queries containing the key
    pub failures: Mutex<Vec<(String, String)>>,
    pub segment_delay: Duration,
    /// Keep streaming after the turn is cancelled, like a provider without abort support
    pub ignores_cancel: bool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<LLMRequest>>,
}

impl StubLLM {
    pub fn reply(self, key: &str, segments: &[&str]) -> Self {
        self.replies.lock().push((
            key.to_string(),
            segments.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn fail(self, key: &str, message: &str) -> Self {
        self.failures
            .lock()
            .push((key.to_string(), message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BaseLLM for StubLLM {
    async fn stream_query(
        &self,
        scope: CancellationToken,
        request: LLMRequest,
        on_segment: LLMSegmentCallback,
    ) -> Result<String, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(key, _)| request.query.contains(key.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(LLMError::RequestFailed(message));
        }

        let segments = self
            .replies
            .lock()
            .iter()
            .find(|(key, _)| request.query.contains(key.as_str()))
            .map(|(_, segments)| segments.clone())
            .unwrap_or_default();

        let mut full = String::new();
        let count = segments.len();
        for (i, segment) in segments.into_iter().enumerate() {
            if self.ignores_cancel {
                tokio::time::sleep(self.segment_delay).await;
            } else if !self.segment_delay.is_zero() {
                tokio::select! {
                    _ = scope.cancelled() => return Err(LLMError::StreamInterrupted("cancelled".to_string())),
                    _ = tokio::time::sleep(self.segment_delay) => {}
                }
            }
            full.push_str(&segment);
            on_segment(segment, i + 1 == count).await;
        }

        Ok(full)
    }

    fn provider(&self) -> &'static str {
        "stub-llm"
    }
}

// ============================================================================
// Knowledge base and usage
// ============================================================================

#[derive(Default)]
pub struct StubKnowledge {
    pub passages: Vec<KnowledgePassage>,
    pub searches: AtomicUsize,
}

#[async_trait]
impl KnowledgeBase for StubKnowledge {
    async fn search(
        &self,
        _key: &str,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}

#[derive(Default)]
pub struct StubUsage {
    records: Mutex<Vec<UsageRecord>>,
}

impl StubUsage {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl UsageSink for StubUsage {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageError> {
        self.records.lock().push(record);
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub session: Arc<Session>,
    pub sink: Arc<RecordingSink>,
    pub stt: Arc<StubSTT>,
    pub tts: Arc<StubTTS>,
    pub llm: Arc<StubLLM>,
}

impl Harness {
    /// Build a session around the given stubs and start its synthesis queue
    pub fn start(tts: StubTTS, llm: StubLLM, settings: PipelineSettings) -> Self {
        Self::start_with(tts, llm, settings, SessionOptions::default(), None, None)
    }

    pub fn start_with(
        tts: StubTTS,
        llm: StubLLM,
        settings: PipelineSettings,
        options: SessionOptions,
        knowledge: Option<Arc<StubKnowledge>>,
        usage: Option<Arc<StubUsage>>,
    ) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let stt = Arc::new(StubSTT::default());
        let tts = Arc::new(tts);
        let llm = Arc::new(llm);

        let providers = SessionProviders {
            stt: stt.clone(),
            tts: tts.clone(),
            llm: llm.clone(),
            knowledge: knowledge.map(|k| k as Arc<dyn KnowledgeBase>),
            usage: usage.map(|u| u as Arc<dyn UsageSink>),
        };

        let (session, queues): (Arc<Session>, SessionQueues) = Session::new(
            "harness",
            options,
            settings,
            providers,
            sink.clone(),
        );
        stt.mark_connected();
        tokio::spawn(vocalis::core::synthesis::run_synthesis_queue(
            session.clone(),
            queues,
        ));
        session.set_active(true);

        Self {
            session,
            sink,
            stt,
            tts,
            llm,
        }
    }
}

/// Provider factory handing out fresh stubs and keeping the recognizer for the test
pub struct StubFactory {
    pub stt: Arc<StubSTT>,
    pub tts: Arc<StubTTS>,
    pub llm: Arc<StubLLM>,
}

#[async_trait]
impl ProviderFactory for StubFactory {
    async fn create(&self, _options: &SessionOptions) -> Result<SessionProviders, ProviderError> {
        Ok(SessionProviders {
            stt: self.stt.clone(),
            tts: self.tts.clone(),
            llm: self.llm.clone(),
            knowledge: None,
            usage: None,
        })
    }
}
