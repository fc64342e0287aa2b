//! Authentication: password hashing and the lockout-enforcing authenticator.

pub mod authenticator;
pub mod password;

pub use authenticator::{Authenticator, LockoutPolicy, DEFAULT_LOCK_DURATION, DEFAULT_MAX_ATTEMPTS};
pub use password::{
    hash_password, verify_password, PasswordPolicy, DEFAULT_BCRYPT_COST,
    DEFAULT_MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH,
};
