//! # Domain Traits
//!
//! Abstract interfaces for the chat service.
//! Allows for pluggable implementations in the Infrastructure layer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::types::ChatEvent;

/// Abstract interface for sending messages (e.g., Matrix, Console)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a markdown message to `target` (a room or a user).
    /// Returns the ID of the sent message.
    async fn send_message(&self, target: &str, content: &str) -> Result<String, String>;
}

/// A connectable chat service producing a stream of events.
#[async_trait]
pub trait ChatTransport: ChatProvider {
    /// Open the connection. Events flow through the returned receiver until the
    /// connection ends; the stream closes or yields `ChatEvent::Disconnected`.
    async fn connect(&self) -> anyhow::Result<mpsc::Receiver<ChatEvent>>;

    /// Close the connection and wait until it is fully closed.
    async fn disconnect(&self) -> anyhow::Result<()>;
}
