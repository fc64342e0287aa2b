//! Principal records and the identity view used by the authorizer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::privilege::Privilege;

/// What the authorizer needs to know about a subject.
///
/// Kept narrow so privilege resolution does not depend on the full shape of
/// the credential record.
pub trait Identity {
    /// Login name.
    fn username(&self) -> &str;

    /// Names of the roles attached to this identity.
    fn roles(&self) -> &BTreeSet<String>;

    /// Privileges granted directly, outside of any role.
    fn privileges(&self) -> Privilege;
}

/// A user account as held by a credential store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Login name. Identity is compared case-insensitively.
    pub username: String,
    /// Bcrypt hash of the password.
    pub password_hash: String,
    /// Attached role names.
    pub roles: BTreeSet<String>,
    /// Directly granted privileges.
    pub privileges: Privilege,
    /// Explicit administrative lock.
    pub locked: bool,
    /// When the password stops being accepted.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Create an unlocked principal with no roles or privileges.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            roles: BTreeSet::new(),
            privileges: Privilege::NONE,
            locked: false,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach roles.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Grant direct privileges.
    pub fn with_privileges(mut self, privileges: Privilege) -> Self {
        self.privileges |= privileges;
        self
    }

    /// Set the password expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Mark the account as locked.
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Case-insensitive identity key.
    pub fn key(&self) -> String {
        normalize_username(&self.username)
    }

    /// Whether the password has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Identity for Principal {
    fn username(&self) -> &str {
        &self.username
    }

    fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    fn privileges(&self) -> Privilege {
        self.privileges
    }
}

/// Identity key for a username.
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}
