mod base;

pub use base::{AudioFormat, BaseTTS, TTSAudioCallback, TTSError};
