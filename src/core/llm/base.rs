use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// A single streaming completion request
#[derive(Debug, Clone, PartialEq)]
pub struct LLMRequest {
    pub model: String,
    /// Full prompt text, system guidance included
    pub query: String,
    /// Sampling temperature, `None` leaves the provider default
    pub temperature: Option<f32>,
    /// Output limit, `None` means unlimited
    pub max_tokens: Option<u32>,
}

/// Error types for language model calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Callback invoked once per streamed segment.
///
/// The flag is `true` on the segment that completes the response.
pub type LLMSegmentCallback =
    Arc<dyn Fn(String, bool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Streaming language model client
#[async_trait::async_trait]
pub trait BaseLLM: Send + Sync {
    /// Run a streaming query.
    ///
    /// Each segment is passed to `on_segment` and awaited before the next one is read.
    /// Returns the complete response text. Implementations stop early once `scope`
    /// is cancelled.
    async fn stream_query(
        &self,
        scope: CancellationToken,
        request: LLMRequest,
        on_segment: LLMSegmentCallback,
    ) -> Result<String, LLMError>;

    fn provider(&self) -> &'static str;
}
