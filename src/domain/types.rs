//! # Domain Types
//!
//! Common data structures and enums used across the application logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat-service user identifier (e.g. `@alice:example.org`).
pub type UserId = String;

/// A text message as seen by the cogs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub event_id: String,
    pub room_id: String,
    pub sender: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Sent in a one-to-one room with the bot.
    pub is_direct: bool,
}

/// Events produced by a connected chat transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Ready,
    MessageCreated(ChatMessage),
    MessageEdited {
        original_event_id: String,
        message: ChatMessage,
    },
    MessageDeleted {
        room_id: String,
        event_id: String,
    },
    /// The connection ended. `error` is set when it ended on a protocol failure.
    Disconnected { error: Option<String> },
}

impl ChatEvent {
    /// Author of a message event.
    pub fn sender(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageCreated(msg) | ChatEvent::MessageEdited { message: msg, .. } => {
                Some(&msg.sender)
            }
            _ => None,
        }
    }
}

/// Which kind of wizard a user is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardKind {
    New,
    Edit,
}

impl WizardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardKind::New => "new",
            WizardKind::Edit => "edit",
        }
    }
}

/// Process exit statuses reported by the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    Error,
    ExtensionLoad,
    RetryLimitExceeded,
    ConfigFile,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::Error => 1,
            ExitStatus::ExtensionLoad => 7,
            ExitStatus::RetryLimitExceeded => 8,
            ExitStatus::ConfigFile => 17,
        }
    }
}
