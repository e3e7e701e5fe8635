//! Hijack mode: raw byte relay for upgraded connections
//!
//! Used for exec attach streams, engine socket access and any protocol that
//! leaves HTTP after the handshake. Only the captured request head is
//! written by the agent; everything after it is relayed uninterpreted.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_native_tls::native_tls;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use hl_protocol::{HttpEnvelope, Message, SessionKey};

use super::content_length::content_length;
use super::ProxyError;
use crate::http_io::{HttpReader, HttpWriter};

/// Relay a hijacked session until both directions have finished.
///
/// `https` and `wss` targets are wrapped in TLS; `insecure_skip_verify`
/// turns off certificate and hostname checks for them.
pub(super) async fn relay(
    key: &SessionKey,
    request: HttpEnvelope,
    insecure_skip_verify: bool,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<Message>,
) -> Result<(), ProxyError> {
    let length = content_length(&request)?;
    let url = Url::parse(&request.url).map_err(|e| ProxyError::InvalidUrl {
        url: request.url.clone(),
        reason: e.to_string(),
    })?;
    let target = Target::from_url(&url)?;
    let mut head = request_head(&request, &url)?;

    let stream = TcpStream::connect(&target.address)
        .await
        .map_err(|source| ProxyError::Dial {
            address: target.address.clone(),
            source,
        })?;
    tracing::debug!(
        key = %key,
        address = %target.address,
        tls = target.tls_domain.is_some(),
        "Hijack connection opened"
    );

    let mut reader = HttpReader::with_initial(key.clone(), inbound, request.body, request.eof);
    if let Some(length) = length.filter(|n| *n > 0) {
        let length = usize::try_from(length)
            .map_err(|_| ProxyError::InvalidContentLength(length.to_string()))?;
        let start = head.len();
        head.resize(start + length, 0);
        reader.read_exact(&mut head[start..]).await?;
    }

    let writer = HttpWriter::new(key.clone(), outbound);
    match &target.tls_domain {
        Some(domain) => {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(insecure_skip_verify)
                .danger_accept_invalid_hostnames(insecure_skip_verify)
                .build()?;
            let stream = tokio_native_tls::TlsConnector::from(connector)
                .connect(domain, stream)
                .await?;
            pump(key, stream, &head, reader, writer).await?;
        }
        None => pump(key, stream, &head, reader, writer).await?,
    }

    tracing::debug!(key = %key, "Hijack connection closed");
    Ok(())
}

/// Write the head, then copy bytes both ways.
///
/// Returns once the session's inbound queue has closed, even if the
/// target is still holding its side open.
async fn pump<S>(
    key: &SessionKey,
    stream: S,
    head: &[u8],
    mut reader: HttpReader,
    mut writer: HttpWriter,
) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite,
{
    let (mut target_read, mut target_write) = tokio::io::split(stream);
    target_write.write_all(head).await?;

    let session_closed = CancellationToken::new();
    let closed = &session_closed;

    let upstream = async move {
        match tokio::io::copy(&mut reader, &mut target_write).await {
            Ok(sent) => tracing::debug!(key = %key, sent, "Client stream finished"),
            Err(e) => tracing::warn!(key = %key, "Relay to target stopped: {}", e),
        }
        if let Err(e) = target_write.shutdown().await {
            tracing::debug!(key = %key, "Half-close failed: {}", e);
        }
        // The transport blocks on this queue, so keep consuming until it is closed.
        reader.drain().await;
        closed.cancel();
    };

    let downstream = async move {
        tokio::select! {
            copied = tokio::io::copy(&mut target_read, &mut writer) => match copied {
                Ok(received) => tracing::debug!(key = %key, received, "Target stream finished"),
                Err(e) => tracing::warn!(key = %key, "Relay from target stopped: {}", e),
            },
            _ = closed.cancelled() => {
                tracing::debug!(key = %key, "Session closed while the target was still open");
            }
        }
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(key = %key, "Failed to send EOF: {}", e);
        }
    };

    tokio::join!(upstream, downstream);
    Ok(())
}

/// Where a hijacked request is dialed
#[derive(Debug, PartialEq, Eq)]
struct Target {
    address: String,
    /// Name checked against the target certificate; `None` for plain TCP
    tls_domain: Option<String>,
}

impl Target {
    fn from_url(url: &Url) -> Result<Self, ProxyError> {
        let tls = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            other => return Err(ProxyError::UnsupportedScheme(other.to_string())),
        };

        let host = url.host().ok_or_else(|| ProxyError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let domain = match host {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        let port = url
            .port_or_known_default()
            .unwrap_or(if tls { 443 } else { 80 });

        let address = match host {
            Host::Ipv6(_) => format!("[{}]:{}", domain, port),
            _ => format!("{}:{}", domain, port),
        };
        Ok(Self {
            address,
            tls_domain: tls.then_some(domain),
        })
    }
}

/// Serialize the captured request line and headers.
///
/// Headers are written as captured. `Connection: close` replaces any
/// captured `Connection` header unless it asks for an upgrade, so plain
/// requests end when the target finishes responding.
fn request_head(request: &HttpEnvelope, url: &Url) -> Result<Vec<u8>, ProxyError> {
    let method = if request.method.is_empty() {
        "GET"
    } else {
        request.method.as_str()
    };

    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let host = if request.host.is_empty() {
        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    } else {
        request.host.clone()
    };

    let upgrade = request.header("Connection").map_or(false, |value| {
        value
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    });

    let mut head = format!("{} {} HTTP/1.1\r\n", method, target);
    push_header(&mut head, "Host", &host)?;
    for (name, values) in &request.headers {
        if name.eq_ignore_ascii_case("host") || (!upgrade && name.eq_ignore_ascii_case("connection"))
        {
            continue;
        }
        for value in values {
            push_header(&mut head, name, value)?;
        }
    }
    if !upgrade {
        push_header(&mut head, "Connection", "close")?;
    }
    head.push_str("\r\n");

    Ok(head.into_bytes())
}

fn push_header(head: &mut String, name: &str, value: &str) -> Result<(), ProxyError> {
    let forbidden = |s: &str| s.contains('\r') || s.contains('\n');
    if name.is_empty() || forbidden(name) || name.contains(':') || forbidden(value) {
        return Err(ProxyError::InvalidRequest(format!(
            "header {:?} cannot be written",
            name
        )));
    }
    head.push_str(name);
    head.push_str(": ");
    head.push_str(value);
    head.push_str("\r\n");
    Ok(())
}
