//! Chat payloads and the diagnostic log records handed to the UI.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A chat message as it travels over a gossip topic.
///
/// Sender fields are supplied by the sender and are not verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text.
    pub message: String,
    /// Endpoint id of the sender, as a string.
    #[serde(rename = "senderid")]
    pub sender_id: String,
    /// Display name of the sender.
    #[serde(rename = "sendername")]
    pub sender_name: String,
}

impl ChatMessage {
    /// Create a new chat message.
    pub fn new(
        message: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
        }
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parse a wire payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Log prefix for publish-side failures.
pub const PUBLISH_ERROR: &str = "puberr";
/// Log prefix for subscribe-side failures.
pub const SUBSCRIBE_ERROR: &str = "suberr";

/// A diagnostic entry flowing from a chat room to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLog {
    /// Category tag, e.g. `puberr`.
    pub prefix: String,
    /// Human readable text.
    pub message: String,
}

impl ChatLog {
    /// Create a new log entry.
    pub fn new(prefix: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ChatLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>: {}", self.prefix, self.message)
    }
}
