//! Outbound half of a voice connection
//!
//! Every task that writes to the client goes through [`WsClientSink`], which forwards
//! frames over a channel to the one task that owns the socket's sender half. Frames are
//! written in the order they were queued and never interleave.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::messages::MessageRoute;
use crate::core::events::{ClientSink, OutgoingMessage, SinkError};

/// [`ClientSink`] feeding the connection's writer task
pub struct WsClientSink {
    routes: mpsc::Sender<MessageRoute>,
    closed: AtomicBool,
}

impl WsClientSink {
    pub fn new(routes: mpsc::Sender<MessageRoute>) -> Self {
        Self {
            routes,
            closed: AtomicBool::new(false),
        }
    }

    async fn route(&self, route: MessageRoute) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.routes.send(route).await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl ClientSink for WsClientSink {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SinkError> {
        self.route(MessageRoute::Outgoing(message)).await
    }

    async fn send_audio(&self, audio: Bytes) -> Result<(), SinkError> {
        self.route(MessageRoute::Binary(audio)).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.routes.send(MessageRoute::Close).await;
    }
}

/// Write queued frames to the socket until it closes or a close is requested
pub async fn run_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut routes: mpsc::Receiver<MessageRoute>,
    session_id: String,
) {
    while let Some(route) = routes.recv().await {
        let result = match route {
            MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                Err(e) => {
                    error!(session_id = %session_id, "Failed to serialize outgoing message: {}", e);
                    continue;
                }
            },
            MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
            MessageRoute::Close => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        if let Err(e) = result {
            debug!(session_id = %session_id, "Failed to send WebSocket message: {}", e);
            break;
        }
    }

    routes.close();
    debug!(session_id = %session_id, "WebSocket writer stopped");
}
