mod base;

pub use base::{BaseSTT, RecognitionEvent, STTError, STTErrorCallback, STTResultCallback};
