//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame did not contain the `key||type||body` triple
    #[error("Malformed frame: expected 3 fields, got {0}")]
    MalformedFrame(usize),

    /// Unknown message type
    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// Envelope JSON could not be decoded
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),
}
