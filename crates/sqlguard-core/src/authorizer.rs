//! Privilege resolution over direct grants and roles.
//!
//! Resolution order, stopping at the first match:
//! 1. direct `admin` bypasses everything
//! 2. direct privileges cover the request
//! 3. any attached role covers it at global, database, or table scope
//!
//! Roles are a union: one granting role is enough. Dangling role names grant
//! nothing and are not errors.

use std::sync::Arc;

use crate::error::{SecurityError, SecurityResult};
use crate::privilege::Privilege;
use crate::store::{Identity, RoleStore};

/// One (database, table, privilege) requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeCheck {
    /// Target database. Empty means no database scope applies.
    pub database: String,
    /// Target table. Empty means no table scope applies.
    pub table: String,
    /// Required privileges.
    pub required: Privilege,
}

impl PrivilegeCheck {
    /// Create a check.
    pub fn new(database: impl Into<String>, table: impl Into<String>, required: Privilege) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            required,
        }
    }

    /// `database.table` rendering used in denials.
    pub fn object(&self) -> String {
        object_name(&self.database, &self.table)
    }
}

/// Resolves whether an identity holds a privilege on an object.
pub struct Authorizer {
    roles: Arc<dyn RoleStore>,
}

impl Authorizer {
    /// Create an authorizer backed by a role store.
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Check a single privilege requirement.
    pub fn check_privilege<I: Identity + ?Sized>(
        &self,
        identity: &I,
        database: &str,
        table: &str,
        required: Privilege,
    ) -> SecurityResult<()> {
        let direct = identity.privileges();
        if direct.has(Privilege::ADMIN) || direct.has(required) {
            return Ok(());
        }

        for role_name in identity.roles() {
            let Some(role) = self.roles.get_by_name(role_name) else {
                tracing::debug!(
                    username = identity.username(),
                    role = %role_name,
                    "skipping unknown role"
                );
                continue;
            };
            if role.allows(database, table, required) {
                return Ok(());
            }
        }

        tracing::debug!(
            username = identity.username(),
            object = %object_name(database, table),
            privilege = %required,
            "access denied"
        );
        Err(SecurityError::AccessDenied {
            username: identity.username().to_string(),
            privilege: required.to_string(),
            object: object_name(database, table),
        })
    }

    /// Check requirements in order and return the first denial.
    ///
    /// This is a read-only gate; nothing is rolled back when a later check fails.
    pub fn check_privileges<I: Identity + ?Sized>(
        &self,
        identity: &I,
        checks: &[PrivilegeCheck],
    ) -> SecurityResult<()> {
        checks.iter().try_for_each(|check| {
            self.check_privilege(identity, &check.database, &check.table, check.required)
        })
    }
}

fn object_name(database: &str, table: &str) -> String {
    match (database.is_empty(), table.is_empty()) {
        (true, _) => "*.*".to_string(),
        (false, true) => format!("{}.*", database),
        (false, false) => format!("{}.{}", database, table),
    }
}
