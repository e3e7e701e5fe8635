//! Proxy handler: tunnels HTTP requests to local endpoints
//!
//! The first envelope of a session describes the request. Without `hijack`
//! the request is replayed through an HTTP client and the response streamed
//! back as envelopes; with `hijack` the request head is written to a raw TCP
//! connection and bytes are relayed in both directions untouched.

mod buffered;
mod content_length;
mod hijack;

pub use content_length::content_length;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use hl_core::error::{AuthError, SessionError};
use hl_core::traits::{Handler, TokenValidator};
use hl_core::InitialRequest;
use hl_protocol::{HttpEnvelope, Message, ProtocolError, SessionKey};

/// Errors that end a proxied session
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Session closed before the request envelope arrived
    #[error("Session closed before the request envelope arrived")]
    MissingRequest,

    /// Request envelope could not be decoded
    #[error("Invalid request envelope: {0}")]
    InvalidEnvelope(#[from] ProtocolError),

    /// Initial message could not be parsed
    #[error(transparent)]
    InitialMessage(#[from] SessionError),

    /// Token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// `Content-Length` header is not a valid length
    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// Request URL could not be parsed or has no host
    #[error("Invalid request URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Hijack target uses a scheme the relay cannot dial
    #[error("Unsupported scheme for raw relay: {0}")]
    UnsupportedScheme(String),

    /// Request method or headers could not be used
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Target connection could not be opened
    #[error("Failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS setup or handshake with a hijack target failed
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_native_tls::native_tls::Error),

    /// HTTP client failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// I/O failure on the session or target connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handler that proxies HTTP and upgraded connections to local targets
pub struct ProxyHandler {
    client: reqwest::Client,
    insecure_skip_verify: bool,
    validator: Option<Arc<dyn TokenValidator>>,
}

impl ProxyHandler {
    /// Create a proxy handler
    ///
    /// `insecure_skip_verify` disables certificate checks for TLS targets
    /// in both modes.
    pub fn new(insecure_skip_verify: bool) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        Ok(Self {
            client,
            insecure_skip_verify,
            validator: None,
        })
    }

    /// Require a valid token in each session's initial message
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    fn authorize(&self, initial_message: &str) -> Result<(), ProxyError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let request = InitialRequest::parse(initial_message)?;
        validator.validate(&request.token)?;
        Ok(())
    }

    async fn serve(
        &self,
        key: &SessionKey,
        initial_message: &str,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<Message>,
    ) -> Result<(), ProxyError> {
        self.authorize(initial_message)?;

        let raw = inbound.recv().await.ok_or(ProxyError::MissingRequest)?;
        let request = HttpEnvelope::decode(&raw)?;

        tracing::debug!(
            key = %key,
            method = %request.method,
            url = %request.url,
            hijack = request.hijack,
            "Proxy request"
        );

        if request.hijack {
            hijack::relay(key, request, self.insecure_skip_verify, inbound, outbound).await
        } else {
            buffered::forward(&self.client, key, request, inbound, outbound).await
        }
    }
}

#[async_trait]
impl Handler for ProxyHandler {
    async fn handle(
        &self,
        key: SessionKey,
        initial_message: String,
        inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<Message>,
    ) {
        match self.serve(&key, &initial_message, inbound, outbound).await {
            Ok(()) => tracing::debug!(key = %key, "Proxy session finished"),
            Err(ProxyError::Unauthorized(e)) => {
                tracing::warn!(key = %key, "Refusing proxy session: {}", e)
            }
            Err(e) => tracing::error!(key = %key, "Proxy session failed: {}", e),
        }
    }
}
