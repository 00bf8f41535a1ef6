//! # WebSocket Voice Conversation Module
//!
//! One WebSocket connection is one voice conversation. The client streams microphone
//! audio; the server recognizes it, asks the language model, and streams synthesized
//! speech back.
//!
//! ## Connection Flow
//! 1. Client connects to `/ws/voice`, optionally with query parameters `language`,
//!    `speaker`, `temperature`, `max_tokens`, `system_prompt`, `knowledge_key`, `model`
//! 2. Server creates the session's providers and starts the recognizer
//! 3. Server sends `connected`
//! 4. Client streams raw PCM audio as binary frames
//! 5. Server sends recognized text, reply text and reply audio
//!
//! ## Message Types
//!
//! **Incoming Messages:**
//! - **Binary messages** - Raw PCM audio for recognition
//! - `{"type": "new_session"}` - Forget the conversation and restart recognition
//! - `{"type": "ping"}` - Liveness check
//!
//! **Outgoing Messages:**
//! - `{"type": "connected", "message": "..."}` - Session ready
//! - `{"type": "asr_result", "text": "..."}` - New recognized text sent to the model
//! - `{"type": "llm_response", "text": "..."}` - Incremental model output
//! - `{"type": "tts_start", "sampleRate": 16000, "channels": 1, "bitDepth": 16}` - Audio follows
//! - **Binary messages** - Synthesized PCM audio, chunked
//! - `{"type": "tts_end"}` - Audio for one sentence finished
//! - `{"type": "session_cleared", "message": "..."}` - Reply to `new_session`
//! - `{"type": "pong"}` - Reply to `ping`
//! - `{"type": "error", "message": "...", "fatal": false}` - Error; when `fatal` is true the
//!   server closes the connection right after
//!
//! ## JavaScript Client Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:3001/ws/voice?language=zh-CN&max_tokens=200');
//! ws.binaryType = 'arraybuffer';
//!
//! ws.onmessage = (event) => {
//!   if (event.data instanceof ArrayBuffer) {
//!     player.enqueue(new Int16Array(event.data));
//!     return;
//!   }
//!   const message = JSON.parse(event.data);
//!   switch (message.type) {
//!     case 'connected':
//!       microphone.start((pcm) => ws.send(pcm));
//!       break;
//!     case 'asr_result':
//!       console.log('You said:', message.text);
//!       break;
//!     case 'tts_start':
//!       player.configure(message.sampleRate, message.channels, message.bitDepth);
//!       break;
//!     case 'error':
//!       console.error(message.message);
//!       break;
//!   }
//! };
//! ```

mod error;
mod handler;
mod messages;
mod processor;
mod sink;
mod supervisor;


pub use error::{WebSocketError, WebSocketResult};
pub use handler::ws_voice_handler;
pub use messages::{IncomingMessage, MessageRoute};
pub use processor::{handle_audio, handle_text};
pub use sink::WsClientSink;
