//! Frame format for the hostlink protocol
//!
//! Every WebSocket text frame carries exactly one message encoded as
//!
//! ```text
//! key||type||body
//! ```
//!
//! where `type` is the decimal message type. Only the first two separators
//! are significant; the body may itself contain `||`.
//!
//! # Message Flow
//!
//! 1. Broker sends `Open` with the handler-selection URL as body
//! 2. Both sides exchange `Data` messages for that key
//! 3. Either side sends `Close`; the agent always sends one after its
//!    handler returns

use crate::error::ProtocolError;
use crate::session::SessionKey;

/// Separator between the three fields of a frame
pub const MESSAGE_SEPARATOR: &str = "||";

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Open a new session
    Open,
    /// Session payload
    Data,
    /// Close a session
    Close,
}

impl MessageType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "0",
            Self::Data => "1",
            Self::Close => "2",
        }
    }

    /// Parse the wire representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::Open),
            "1" => Some(Self::Data),
            "2" => Some(Self::Close),
            _ => None,
        }
    }
}

/// A single multiplexed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Session this message belongs to
    pub key: SessionKey,
    /// Kind of message
    pub message_type: MessageType,
    /// Opaque payload
    pub body: String,
}

impl Message {
    /// Create a new message
    pub fn new(key: SessionKey, message_type: MessageType, body: impl Into<String>) -> Self {
        Self {
            key,
            message_type,
            body: body.into(),
        }
    }

    /// Data message for a session
    pub fn data(key: SessionKey, body: impl Into<String>) -> Self {
        Self::new(key, MessageType::Data, body)
    }

    /// Close message for a session
    pub fn close(key: SessionKey) -> Self {
        Self::new(key, MessageType::Close, String::new())
    }

    /// Encode into the `key||type||body` wire form
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(self.key.as_str().len() + self.body.len() + 5);
        out.push_str(self.key.as_str());
        out.push_str(MESSAGE_SEPARATOR);
        out.push_str(self.message_type.as_str());
        out.push_str(MESSAGE_SEPARATOR);
        out.push_str(&self.body);
        out
    }

    /// Decode from the `key||type||body` wire form
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let mut parts = raw.splitn(3, MESSAGE_SEPARATOR);
        let (Some(key), Some(kind), Some(body)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::MalformedFrame(
                raw.splitn(3, MESSAGE_SEPARATOR).count(),
            ));
        };

        let message_type = MessageType::parse(kind)
            .ok_or_else(|| ProtocolError::UnknownMessageType(kind.to_string()))?;

        Ok(Self {
            key: SessionKey::new(key),
            message_type,
            body: body.to_string(),
        })
    }
}
