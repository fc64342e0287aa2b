//! SQLGuard Core - authentication, authorization, and auditing for a SQL server.
//!
//! Three pieces form the security decision pipeline:
//! - [`Authenticator`] verifies credentials and enforces failure lockout
//! - [`Authorizer`] resolves privileges across global, database, and table scope
//! - the [`audit`] pipeline turns security events into a durable JSON-lines log
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sqlguard_core::{Authorizer, GrantScope, MemoryRoleStore, Principal, Privilege, Role, RoleStore};
//!
//! let roles = Arc::new(MemoryRoleStore::new());
//! roles.create(Role::new("readonly").with_grant(GrantScope::Global, Privilege::READ))?;
//!
//! let bob = Principal::new("bob", hash).with_roles(["readonly"]);
//! let authz = Authorizer::new(roles);
//! authz.check_privilege(&bob, "db1", "t1", Privilege::READ)?;
//! ```

pub mod audit;
pub mod auth;
pub mod authorizer;
pub mod error;
pub mod privilege;
pub mod store;

pub use audit::{
    AuditEvent, AuditEventType, AuditFilter, AuditLogger, AuditLoggerConfig, AuditResult,
    AuditState, FileAuditLogger, MemoryAuditLogger, NullAuditLogger,
};
pub use auth::{hash_password, verify_password, Authenticator, LockoutPolicy, PasswordPolicy};
pub use authorizer::{Authorizer, PrivilegeCheck};
pub use error::{SecurityError, SecurityResult};
pub use privilege::Privilege;
pub use store::{
    CredentialStore, GrantScope, Identity, MemoryCredentialStore, MemoryRoleStore, Principal,
    Role, RoleStore,
};
