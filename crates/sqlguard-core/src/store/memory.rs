//! In-memory stores guarded by a single read/write lock each.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::principal::{normalize_username, Principal};
use super::role::Role;
use super::{CredentialStore, RoleStore};
use crate::error::{SecurityError, SecurityResult};

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<String, Principal>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_by_username(&self, username: &str) -> Option<Principal> {
        self.users.read().get(&normalize_username(username)).cloned()
    }

    fn create(&self, principal: Principal) -> SecurityResult<()> {
        let key = principal.key();
        let mut users = self.users.write();
        if users.contains_key(&key) {
            return Err(SecurityError::UserAlreadyExists(principal.username));
        }
        users.insert(key, principal);
        Ok(())
    }

    fn update(&self, mut principal: Principal) -> SecurityResult<()> {
        let key = principal.key();
        let mut users = self.users.write();
        match users.get_mut(&key) {
            Some(existing) => {
                principal.touch();
                *existing = principal;
                Ok(())
            }
            None => Err(SecurityError::UserNotFound(principal.username)),
        }
    }

    fn delete(&self, username: &str) -> SecurityResult<()> {
        self.users
            .write()
            .remove(&normalize_username(username))
            .map(|_| ())
            .ok_or_else(|| SecurityError::UserNotFound(username.to_string()))
    }

    fn list_all(&self) -> Vec<Principal> {
        let mut users: Vec<Principal> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }
}

/// In-memory role store.
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<String, Role>>,
}

impl MemoryRoleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored roles.
    pub fn len(&self) -> usize {
        self.roles.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.roles.read().is_empty()
    }
}

impl RoleStore for MemoryRoleStore {
    fn get_by_name(&self, name: &str) -> Option<Role> {
        self.roles.read().get(name).cloned()
    }

    fn create(&self, role: Role) -> SecurityResult<()> {
        let mut roles = self.roles.write();
        if roles.contains_key(&role.name) {
            return Err(SecurityError::RoleAlreadyExists(role.name));
        }
        roles.insert(role.name.clone(), role);
        Ok(())
    }

    fn update(&self, role: Role) -> SecurityResult<()> {
        let mut roles = self.roles.write();
        match roles.get_mut(&role.name) {
            Some(existing) => {
                *existing = role;
                Ok(())
            }
            None => Err(SecurityError::RoleNotFound(role.name)),
        }
    }

    fn delete(&self, name: &str) -> SecurityResult<()> {
        self.roles
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecurityError::RoleNotFound(name.to_string()))
    }

    fn list_all(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.read().values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::Privilege;
    use crate::store::GrantScope;

    #[test]
    fn test_usernames_are_case_insensitive() {
        let store = MemoryCredentialStore::new();
        store.create(Principal::new("Alice", "h")).unwrap();

        assert!(store.get_by_username("alice").is_some());
        assert!(store.get_by_username("ALICE").is_some());
        assert!(matches!(
            store.create(Principal::new("aLiCe", "h")),
            Err(SecurityError::UserAlreadyExists(_))
        ));
        store.delete("ALICE").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_requires_existing() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            store.update(Principal::new("ghost", "h")),
            Err(SecurityError::UserNotFound(_))
        ));

        store.create(Principal::new("bob", "h")).unwrap();
        let mut bob = store.get_by_username("bob").unwrap();
        bob.locked = true;
        store.update(bob).unwrap();
        assert!(store.get_by_username("bob").unwrap().locked);
    }

    #[test]
    fn test_returned_principal_is_a_copy() {
        let store = MemoryCredentialStore::new();
        store.create(Principal::new("bob", "h")).unwrap();

        let mut copy = store.get_by_username("bob").unwrap();
        copy.privileges = Privilege::ADMIN;
        copy.roles.insert("dba".into());

        let fresh = store.get_by_username("bob").unwrap();
        assert!(fresh.privileges.is_empty());
        assert!(fresh.roles.is_empty());
    }

    #[test]
    fn test_returned_role_is_a_copy() {
        let store = MemoryRoleStore::new();
        store.create(Role::new("readonly")).unwrap();

        let mut copy = store.get_by_name("readonly").unwrap();
        copy.grant(GrantScope::Global, Privilege::ALL);

        assert!(store.get_by_name("readonly").unwrap().global.is_empty());
    }

    #[test]
    fn test_role_store_conflicts() {
        let store = MemoryRoleStore::new();
        store.create(Role::new("readonly")).unwrap();
        assert!(matches!(
            store.create(Role::new("readonly")),
            Err(SecurityError::RoleAlreadyExists(_))
        ));
        assert!(matches!(
            store.delete("missing"),
            Err(SecurityError::RoleNotFound(_))
        ));
        assert_eq!(store.list_all().len(), 1);
    }
}
