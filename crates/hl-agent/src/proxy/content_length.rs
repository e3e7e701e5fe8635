//! `Content-Length` resolution for captured requests

use hl_protocol::HttpEnvelope;

use super::ProxyError;

/// Declared body length of a captured request.
///
/// Returns `Ok(None)` when no `Content-Length` header is present. A value
/// that is not a plain non-negative decimal integer is an error; guessing a
/// length here would desynchronise the downstream HTTP stream.
pub fn content_length(request: &HttpEnvelope) -> Result<Option<u64>, ProxyError> {
    let Some(raw) = request.header("Content-Length") else {
        return Ok(None);
    };

    let value = raw.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProxyError::InvalidContentLength(raw.to_string()));
    }

    value
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ProxyError::InvalidContentLength(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_protocol::HeaderMap;

    fn request_with(name: &str, value: &str) -> HttpEnvelope {
        let mut headers = HeaderMap::new();
        headers.insert(name.to_string(), vec![value.to_string()]);
        HttpEnvelope {
            headers,
            ..HttpEnvelope::default()
        }
    }

    #[test]
    fn test_absent() {
        assert_eq!(content_length(&HttpEnvelope::default()).unwrap(), None);
    }

    #[test]
    fn test_valid_values() {
        assert_eq!(
            content_length(&request_with("Content-Length", "6")).unwrap(),
            Some(6)
        );
        assert_eq!(
            content_length(&request_with("content-length", "0")).unwrap(),
            Some(0)
        );
        assert_eq!(
            content_length(&request_with("Content-Length", " 42 ")).unwrap(),
            Some(42)
        );
    }

    #[test]
    fn test_malformed_values() {
        for bad in ["", "-1", "+5", "1.5", "six", "99999999999999999999999"] {
            let result = content_length(&request_with("Content-Length", bad));
            assert!(
                matches!(result, Err(ProxyError::InvalidContentLength(ref v)) if v == bad),
                "{bad:?} should be rejected"
            );
        }
    }
}
