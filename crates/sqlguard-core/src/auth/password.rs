//! Password hashing and validation.

use bcrypt::{hash, verify};

use crate::error::{SecurityError, SecurityResult};

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Default minimum password length.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Bcrypt only looks at the first 72 bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> SecurityResult<String> {
    hash(password, cost).map_err(|e| SecurityError::PasswordHash(e.to_string()))
}

/// Verify a password against a bcrypt hash.
///
/// A malformed hash counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::error!(error = %e, "stored password hash could not be verified");
            false
        }
    }
}

/// Length rules applied when a password is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Maximum length in bytes.
    pub max_length: usize,
}

impl PasswordPolicy {
    /// Policy with a custom minimum length.
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Self::default()
        }
    }

    /// Check a candidate password.
    pub fn validate(&self, password: &str) -> SecurityResult<()> {
        if password.chars().count() < self.min_length {
            return Err(SecurityError::WeakPassword(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if password.len() > self.max_length {
            return Err(SecurityError::WeakPassword(format!(
                "password must be at most {} bytes",
                self.max_length
            )));
        }
        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            max_length: MAX_PASSWORD_LENGTH,
        }
    }
}
