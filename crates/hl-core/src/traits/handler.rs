//! Session handler contract

use async_trait::async_trait;
use tokio::sync::mpsc;

use hl_protocol::{Message, SessionKey};

/// A unit of work bound to a path prefix on the broker connection.
///
/// The transport calls [`Handler::handle`] exactly once for every session
/// whose `Open` path resolves to this handler. The handler owns the session
/// until it returns:
///
/// - `inbound` yields the raw `Data` bodies for the session in arrival order
///   and closes when the broker closes the session or the connection drops.
/// - `outbound` feeds the connection's single writer. Only `Data` messages
///   for `key` may be sent, and nothing may be sent after returning.
///
/// The transport sends the `Close` message once the returned future
/// completes.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Serve one session
    async fn handle(
        &self,
        key: SessionKey,
        initial_message: String,
        inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<Message>,
    );
}
