//! Provider wiring for voice sessions.
//!
//! Concrete recognizer, synthesizer and language-model clients live outside this crate.
//! The server is handed a [`ProviderFactory`] at construction time and asks it for a
//! fresh set of collaborators for every accepted connection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::knowledge::KnowledgeBase;
use crate::core::llm::BaseLLM;
use crate::core::session::SessionOptions;
use crate::core::stt::BaseSTT;
use crate::core::tts::BaseTTS;
use crate::core::usage::UsageSink;

/// Collaborators owned by one voice session
#[derive(Clone)]
pub struct SessionProviders {
    pub stt: Arc<dyn BaseSTT>,
    pub tts: Arc<dyn BaseTTS>,
    pub llm: Arc<dyn BaseLLM>,
    /// Knowledge base used when the session names a knowledge key
    pub knowledge: Option<Arc<dyn KnowledgeBase>>,
    /// Sink for recognizer usage records
    pub usage: Option<Arc<dyn UsageSink>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("No voice providers are configured on this server")]
    NotConfigured,
    #[error("Failed to create {service} provider: {message}")]
    Creation { service: String, message: String },
}

/// Builds the collaborators for a new session
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self, options: &SessionOptions) -> Result<SessionProviders, ProviderError>;
}

/// Factory used when the binary runs without any provider integration.
///
/// Every connection is refused with [`ProviderError::NotConfigured`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProviders;

#[async_trait]
impl ProviderFactory for UnconfiguredProviders {
    async fn create(&self, _options: &SessionOptions) -> Result<SessionProviders, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}
