pub mod events;
pub mod fatal;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod providers;
pub mod recognition;
pub mod session;
pub mod stt;
pub mod synthesis;
pub mod text;
pub mod tts;
pub mod usage;

// Re-export commonly used types for convenience
pub use events::{ClientSink, OutgoingMessage, SinkError};
pub use fatal::{begin_fatal_shutdown, is_fatal_error, report_provider_error};
pub use knowledge::{KnowledgeBase, KnowledgeError, KnowledgePassage};
pub use llm::{BaseLLM, LLMError, LLMRequest, LLMSegmentCallback};
pub use providers::{ProviderError, ProviderFactory, SessionProviders, UnconfiguredProviders};
pub use session::{PipelineSettings, Session, SessionOptions, SessionQueues};
pub use stt::{BaseSTT, RecognitionEvent, STTError, STTErrorCallback, STTResultCallback};
pub use tts::{AudioFormat, BaseTTS, TTSAudioCallback, TTSError};
pub use usage::{UsageError, UsageRecord, UsageSink};
