//! Shared-key session token validation
//!
//! Tokens are compared by SHA-256 digest so the comparison always runs over
//! the same number of bytes regardless of what the caller presented.

use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::traits::TokenValidator;

/// Accepts exactly one pre-shared token
pub struct SharedKeyValidator {
    digest: [u8; 32],
}

impl SharedKeyValidator {
    /// Create a validator for the given key
    pub fn new(shared_key: &str) -> Self {
        Self {
            digest: Sha256::digest(shared_key.as_bytes()).into(),
        }
    }
}

impl TokenValidator for SharedKeyValidator {
    fn validate(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let presented: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if constant_time_eq(&self.digest, &presented) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Constant-time byte comparison.
///
/// Always iterates over the full length of `expected`.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, byte) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= byte ^ p;
    }
    diff == 0
}
