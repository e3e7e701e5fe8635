//! Session key type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying one logical session on a physical connection.
///
/// Keys are assigned by the broker and are opaque to the agent. A key is
/// unique for the lifetime of the connection it was opened on and is never
/// reused after the session closes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    /// Create a new session key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the raw key value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("abc-123");
        assert_eq!(format!("{}", key), "abc-123");
    }

    #[test]
    fn test_session_key_equality() {
        assert_eq!(SessionKey::from("1"), SessionKey::new(String::from("1")));
        assert_ne!(SessionKey::from("1"), SessionKey::from("2"));
    }
}
