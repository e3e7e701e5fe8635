//! Parsed form of a session's initial message

use url::Url;

use crate::error::SessionError;

/// Base used to resolve path-only initial messages
const RELATIVE_BASE: &str = "http://localhost/";

/// The `Open` body of a session, as seen by a handler.
///
/// The broker sends either a full URL or a path with a query string. The
/// credential travels as the `token` query parameter; the target is named by
/// the `target` parameter or, when that is absent, by the last non-empty
/// path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialRequest {
    /// Request path, used for handler selection
    pub path: String,
    /// Presented credential, empty when absent
    pub token: String,
    /// Target selector, if any
    pub target: Option<String>,
}

impl InitialRequest {
    /// Parse an initial message
    pub fn parse(message: &str) -> Result<Self, SessionError> {
        let url = resolve(message)?;

        let mut token = String::new();
        let mut target = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "token" if token.is_empty() => token = value.into_owned(),
                "target" if target.is_none() && !value.is_empty() => {
                    target = Some(value.into_owned())
                }
                _ => {}
            }
        }

        if target.is_none() {
            target = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(ToString::to_string);
        }

        Ok(Self {
            path: url.path().to_string(),
            token,
            target,
        })
    }
}

/// Path component of an initial message, for routing
pub fn request_path(message: &str) -> Result<String, SessionError> {
    Ok(resolve(message)?.path().to_string())
}

fn resolve(message: &str) -> Result<Url, SessionError> {
    let invalid = |reason: String| SessionError::InvalidInitialMessage {
        message: message.to_string(),
        reason,
    };

    match Url::parse(message) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
            .and_then(|base| base.join(message))
            .map_err(|e| invalid(e.to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}
