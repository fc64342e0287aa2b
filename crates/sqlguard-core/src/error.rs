//! Security-specific error types.

use thiserror::Error;

/// Errors raised by authentication, authorization, the stores, and auditing.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Credentials did not verify.
    ///
    /// Unknown users and wrong passwords both map here so callers cannot
    /// tell them apart.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Account is locked, either by repeated failures or by an administrator.
    #[error("account locked: {0}")]
    AccountLocked(String),

    /// Credentials were valid but the password has expired.
    #[error("password expired for user {0}")]
    PasswordExpired(String),

    /// No direct grant or role grant covers the requested privilege.
    #[error("access denied for user {username}: {privilege} on {object}")]
    AccessDenied {
        /// Principal that was denied.
        username: String,
        /// Privilege that was required.
        privilege: String,
        /// Object the privilege was checked against.
        object: String,
    },

    /// A user with this name already exists.
    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    /// A role with this name already exists.
    #[error("role already exists: {0}")]
    RoleAlreadyExists(String),

    /// No such user.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No such role.
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// Password rejected by the password policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Privilege name outside the known vocabulary.
    #[error("invalid privilege: {0}")]
    InvalidPrivilege(String),

    /// Password hashing failed.
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// Audit pipeline error.
    #[error("audit error: {0}")]
    Audit(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SecurityError::AccessDenied {
            username: "bob".to_string(),
            privilege: "delete".to_string(),
            object: "db1.t1".to_string(),
        };
        assert!(err.to_string().contains("bob"));
        assert!(err.to_string().contains("delete"));
        assert!(err.to_string().contains("db1.t1"));

        let err = SecurityError::RoleNotFound("readonly".into());
        assert_eq!(err.to_string(), "role not found: readonly");
    }

    #[test]
    fn test_authentication_failed_is_generic() {
        assert_eq!(
            SecurityError::AuthenticationFailed.to_string(),
            "authentication failed"
        );
    }
}
