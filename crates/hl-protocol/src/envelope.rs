//! HTTP-shaped envelope carried inside `Data` messages
//!
//! Requests travel broker → agent with `hijack`, `host`, `method`, `url`,
//! `headers`, `body` and `eof`; responses travel back with `code`, `headers`,
//! `body` and `eof`. Every field is omitted from the JSON when it holds its
//! default value, and `body` is standard padded base64.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Multi-valued header map, keyed by header name
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// One structured payload of an HTTP exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEnvelope {
    /// Request wants a raw byte relay instead of HTTP semantics
    #[serde(default, skip_serializing_if = "is_false")]
    pub hijack: bool,

    /// Value for the `Host` header of the outgoing request
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// Request method
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    /// Absolute request URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Request or response headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: HeaderMap,

    /// Response status code (responses only)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u16,

    /// Body fragment
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Bytes::is_empty")]
    pub body: Bytes,

    /// Terminates the body stream
    #[serde(default, skip_serializing_if = "is_false")]
    pub eof: bool,
}

impl HttpEnvelope {
    /// Envelope carrying only a body fragment
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Terminal envelope with no body
    pub fn eof() -> Self {
        Self {
            eof: true,
            ..Self::default()
        }
    }

    /// Response header envelope
    pub fn response(code: u16, headers: HeaderMap) -> Self {
        Self {
            code,
            headers,
            ..Self::default()
        }
    }

    /// Decode from the JSON carried in a `Data` message body
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode to the JSON carried in a `Data` message body
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u16) -> bool {
    *value == 0
}

/// Serialize `Bytes` as a standard base64 string
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Bytes::from)
                .map_err(de::Error::custom),
            None => Ok(Bytes::new()),
        }
    }
}
