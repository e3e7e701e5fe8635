//! Buffered mode: replay the request through an HTTP client

use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue, HOST};
use reqwest::{Body, Method, Url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use hl_protocol::{HeaderMap, HttpEnvelope, Message, SessionKey};

use super::content_length::content_length;
use super::ProxyError;
use crate::http_io::{HttpReader, HttpWriter};

/// Issue the captured request and stream the response back.
///
/// The request body is pulled from the session as the client sends it, and
/// the response head is flushed before any body byte is read so callers of
/// slow or endless responses (log follows, event streams) see it at once.
pub(super) async fn forward(
    client: &reqwest::Client,
    key: &SessionKey,
    request: HttpEnvelope,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<Message>,
) -> Result<(), ProxyError> {
    let length = content_length(&request)?;
    let method = request_method(&request.method)?;
    let url = Url::parse(&request.url).map_err(|e| ProxyError::InvalidUrl {
        url: request.url.clone(),
        reason: e.to_string(),
    })?;
    let headers = request_headers(&request)?;

    let has_body = match length {
        Some(n) => n > 0,
        None => !(request.eof && request.body.is_empty()),
    };
    let reader = HttpReader::with_initial(key.clone(), inbound, request.body, request.eof);

    let mut builder = client.request(method, url).headers(headers);
    if has_body {
        builder = match length {
            Some(n) => builder.body(Body::wrap_stream(ReaderStream::new(reader.take(n)))),
            None => builder.body(Body::wrap_stream(ReaderStream::new(reader))),
        };
    } else {
        // Nothing to send, but the transport still blocks on this queue.
        tokio::spawn(reader.drain());
    }

    let response = builder.send().await?;
    let code = response.status().as_u16();
    tracing::debug!(key = %key, code, "Upstream responded");

    let head = HttpEnvelope::response(code, response_headers(response.headers()));
    let mut writer = HttpWriter::with_response(key.clone(), outbound, head);
    writer.write_header().await?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        writer.write_all(&chunk?).await?;
    }

    writer.shutdown().await?;
    Ok(())
}

fn request_method(method: &str) -> Result<Method, ProxyError> {
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.as_bytes())
        .map_err(|_| ProxyError::InvalidRequest(format!("bad method {:?}", method)))
}

fn request_headers(request: &HttpEnvelope) -> Result<reqwest::header::HeaderMap, ProxyError> {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, values) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProxyError::InvalidRequest(format!("bad header name {:?}", name)))?;
        for value in values {
            let value = HeaderValue::from_str(value).map_err(|_| {
                ProxyError::InvalidRequest(format!("bad value for header {}", name))
            })?;
            headers.append(name.clone(), value);
        }
    }

    if !request.host.is_empty() {
        let host = HeaderValue::from_str(&request.host)
            .map_err(|_| ProxyError::InvalidRequest(format!("bad host {:?}", request.host)))?;
        headers.insert(HOST, host);
    }

    Ok(headers)
}

fn response_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        out.entry(canonical_header_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

/// `content-type` → `Content-Type`
fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}
