//! hl-protocol: Wire protocol for hostlink session multiplexing
//!
//! This crate defines the text frames exchanged between the agent and the
//! broker over the shared WebSocket, and the HTTP-shaped envelope carried
//! inside `Data` frames by the proxy handlers.

pub mod envelope;
pub mod error;
pub mod message;
pub mod session;

pub use envelope::{HeaderMap, HttpEnvelope};
pub use error::ProtocolError;
pub use message::{Message, MessageType, MESSAGE_SEPARATOR};
pub use session::SessionKey;
