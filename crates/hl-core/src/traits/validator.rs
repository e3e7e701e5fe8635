//! Token validation capability

use crate::error::AuthError;

/// Checks the credential carried by a session's initial message.
///
/// Called before a handler opens any connection to its target.
pub trait TokenValidator: Send + Sync {
    /// Accept or reject a token
    fn validate(&self, token: &str) -> Result<(), AuthError>;
}
