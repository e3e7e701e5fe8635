//! `AsyncWrite` that emits envelopes onto the outbound queue

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use hl_protocol::{HttpEnvelope, Message, SessionKey};

/// Writes a session's response stream as `Data` envelopes.
///
/// Every write becomes exactly one envelope. Status and header metadata
/// passed at construction ride on the first envelope only. Shutting the
/// writer down emits a single `eof` envelope; later shutdowns are no-ops.
///
/// Writes wait only for room on the outbound queue, so backpressure comes
/// from the transport's writer.
pub struct HttpWriter {
    key: SessionKey,
    outbound: PollSender<Message>,
    pending: Option<HttpEnvelope>,
    closed: bool,
}

impl HttpWriter {
    /// Writer that emits body-only envelopes
    pub fn new(key: SessionKey, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            key,
            outbound: PollSender::new(outbound),
            pending: None,
            closed: false,
        }
    }

    /// Writer whose first envelope carries the given status and headers
    pub fn with_response(
        key: SessionKey,
        outbound: mpsc::Sender<Message>,
        response: HttpEnvelope,
    ) -> Self {
        Self {
            pending: Some(response),
            ..Self::new(key, outbound)
        }
    }

    /// Send the pending status/header envelope with an empty body.
    ///
    /// Lets the caller see the response head before any body byte exists.
    /// Does nothing when the metadata has already gone out.
    pub async fn write_header(&mut self) -> io::Result<()> {
        if self.pending.is_none() {
            return Ok(());
        }
        poll_fn(|cx| self.poll_emit(cx, &[], false)).await
    }

    fn poll_emit(&mut self, cx: &mut Context<'_>, body: &[u8], eof: bool) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session writer already closed",
            )));
        }

        ready!(self.outbound.poll_reserve(cx)).map_err(|_| outbound_closed())?;

        let mut envelope = self.pending.take().unwrap_or_default();
        envelope.body = Bytes::copy_from_slice(body);
        envelope.eof = eof;

        let encoded = match envelope.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                self.outbound.abort_send();
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, e)));
            }
        };

        tracing::trace!(key = %self.key, len = body.len(), eof, "Envelope sent");
        self.outbound
            .send_item(Message::data(self.key.clone(), encoded))
            .map_err(|_| outbound_closed())?;

        Poll::Ready(Ok(()))
    }
}

fn outbound_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "outbound queue closed")
}

impl AsyncWrite for HttpWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();
        ready!(this.poll_emit(cx, data, false))?;
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Ok(()));
        }
        ready!(this.poll_emit(cx, &[], true))?;
        this.closed = true;
        tracing::debug!(key = %this.key, "Response EOF sent");
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_protocol::{HeaderMap, MessageType};
    use tokio::io::AsyncWriteExt;

    fn decode(message: Message) -> HttpEnvelope {
        assert_eq!(message.message_type, MessageType::Data);
        HttpEnvelope::decode(&message.body).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_rides_first_envelope_only() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type".to_string(), vec!["text/plain".to_string()]);
        let mut writer = HttpWriter::with_response(
            SessionKey::from("k"),
            tx,
            HttpEnvelope::response(200, headers),
        );

        writer.write_all(b"one").await.unwrap();
        writer.write_all(b"two").await.unwrap();

        let first = decode(rx.recv().await.unwrap());
        assert_eq!(first.code, 200);
        assert_eq!(first.body.as_ref(), b"one");
        assert!(first.headers.contains_key("Content-Type"));

        let second = decode(rx.recv().await.unwrap());
        assert_eq!(second.code, 0);
        assert!(second.headers.is_empty());
        assert_eq!(second.body.as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_write_header_sends_empty_body() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = HttpWriter::with_response(
            SessionKey::from("k"),
            tx,
            HttpEnvelope::response(204, HeaderMap::new()),
        );
        writer.write_header().await.unwrap();
        writer.write_header().await.unwrap();

        let header = decode(rx.recv().await.unwrap());
        assert_eq!(header.code, 204);
        assert!(header.body.is_empty());
        assert!(!header.eof);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = HttpWriter::new(SessionKey::from("k"), tx);

        writer.shutdown().await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let eof = decode(rx.recv().await.unwrap());
        assert!(eof.eof);
        assert!(eof.body.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let (tx, _rx) = mpsc::channel(8);
        let mut writer = HttpWriter::new(SessionKey::from("k"), tx);
        writer.shutdown().await.unwrap();

        let err = writer.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_closed_queue_is_broken_pipe() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut writer = HttpWriter::new(SessionKey::from("k"), tx);

        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_messages_carry_session_key() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = HttpWriter::new(SessionKey::from("session-9"), tx);
        writer.write_all(b"x").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().key.as_str(), "session-9");
    }
}
