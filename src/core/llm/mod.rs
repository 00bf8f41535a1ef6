mod base;

pub use base::{BaseLLM, LLMError, LLMRequest, LLMSegmentCallback};
