//! User and role storage.
//!
//! The authenticator and authorizer only see these traits. The in-memory
//! stores are the reference implementation; a durable backend plugs in behind
//! the same interface.
//!
//! Reads return owned copies, so no caller can mutate shared state through a
//! returned record and no lock is held while a privilege check runs.

pub mod memory;
pub mod principal;
pub mod role;

pub use memory::{MemoryCredentialStore, MemoryRoleStore};
pub use principal::{normalize_username, Identity, Principal};
pub use role::{GrantScope, Role};

use crate::error::SecurityResult;

/// Storage for principals, keyed case-insensitively by username.
pub trait CredentialStore: Send + Sync {
    /// Look up a principal.
    fn get_by_username(&self, username: &str) -> Option<Principal>;

    /// Insert a new principal. Fails with `UserAlreadyExists` on conflict.
    fn create(&self, principal: Principal) -> SecurityResult<()>;

    /// Replace an existing principal. Fails with `UserNotFound` if absent.
    fn update(&self, principal: Principal) -> SecurityResult<()>;

    /// Remove a principal. Fails with `UserNotFound` if absent.
    fn delete(&self, username: &str) -> SecurityResult<()>;

    /// Snapshot of every principal.
    fn list_all(&self) -> Vec<Principal>;
}

/// Storage for roles, keyed by name.
pub trait RoleStore: Send + Sync {
    /// Look up a role.
    fn get_by_name(&self, name: &str) -> Option<Role>;

    /// Insert a new role. Fails with `RoleAlreadyExists` on conflict.
    fn create(&self, role: Role) -> SecurityResult<()>;

    /// Replace an existing role. Fails with `RoleNotFound` if absent.
    fn update(&self, role: Role) -> SecurityResult<()>;

    /// Remove a role. Fails with `RoleNotFound` if absent.
    fn delete(&self, name: &str) -> SecurityResult<()>;

    /// Snapshot of every role.
    fn list_all(&self) -> Vec<Role>;
}
