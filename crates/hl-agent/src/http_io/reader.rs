//! Inbound envelope queue as an `AsyncRead`

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use hl_protocol::{HttpEnvelope, SessionKey};

/// Reads the body bytes of the envelopes arriving for one session.
///
/// End-of-stream is latched by an envelope with `eof` set or by the
/// transport closing the queue; both are treated the same. Envelopes with an
/// empty body and no `eof` are skipped.
pub struct HttpReader {
    key: SessionKey,
    inbound: mpsc::Receiver<String>,
    buffered: Bytes,
    eof: bool,
}

impl HttpReader {
    /// Create a reader over a session's inbound queue
    pub fn new(key: SessionKey, inbound: mpsc::Receiver<String>) -> Self {
        Self::with_initial(key, inbound, Bytes::new(), false)
    }

    /// Create a reader seeded with the body of an already-received envelope
    pub fn with_initial(
        key: SessionKey,
        inbound: mpsc::Receiver<String>,
        body: Bytes,
        eof: bool,
    ) -> Self {
        Self {
            key,
            inbound,
            buffered: body,
            eof,
        }
    }

    /// Whether end-of-stream has been observed
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Discard everything left on the inbound queue until the transport
    /// closes it.
    pub async fn drain(mut self) {
        let mut dropped = 0usize;
        while self.inbound.recv().await.is_some() {
            dropped += 1;
        }
        tracing::debug!(key = %self.key, dropped, "Inbound queue closed");
    }
}

impl AsyncRead for HttpReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if !self.buffered.is_empty() {
                let count = self.buffered.len().min(buf.remaining());
                buf.put_slice(&self.buffered[..count]);
                self.buffered.advance(count);
                return Poll::Ready(Ok(()));
            }

            if self.eof {
                return Poll::Ready(Ok(()));
            }

            match self.inbound.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    tracing::debug!(key = %self.key, "Inbound queue closed before EOF");
                    self.eof = true;
                }
                Poll::Ready(Some(raw)) => {
                    let envelope = HttpEnvelope::decode(&raw).map_err(|e| {
                        tracing::error!(key = %self.key, "Invalid envelope: {}", e);
                        io::Error::new(io::ErrorKind::InvalidData, e)
                    })?;
                    tracing::trace!(
                        key = %self.key,
                        len = envelope.body.len(),
                        eof = envelope.eof,
                        "Envelope received"
                    );
                    self.buffered = envelope.body;
                    self.eof = envelope.eof;
                }
            }
        }
    }
}
