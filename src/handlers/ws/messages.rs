//! WebSocket message types and routing

use bytes::Bytes;
use serde::Deserialize;

pub use crate::core::events::OutgoingMessage;

/// JSON control frames accepted from the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Forget the conversation and restart recognition
    #[serde(rename = "new_session")]
    NewSession,
    #[serde(rename = "ping")]
    Ping,
    /// Any other `type`; logged and ignored
    #[serde(other)]
    Unknown,
}

/// Frames handed to the connection's single writer task
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Binary(Bytes),
    /// Send a close frame and stop writing
    Close,
}
