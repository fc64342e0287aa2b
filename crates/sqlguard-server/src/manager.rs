//! Security facade.
//!
//! [`SecurityManager`] is the single entry point the SQL server calls per
//! connection and per statement. It owns the stores, the authenticator, the
//! authorizer, and the audit logger, and it guards every administrative
//! change behind the acting principal's privileges.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlguard_core::auth::hash_password;
use sqlguard_core::store::normalize_username;
use sqlguard_core::{
    AuditEvent, AuditEventType, AuditLogger, AuditResult, Authenticator, Authorizer,
    CredentialStore, FileAuditLogger, GrantScope, Identity, MemoryCredentialStore,
    MemoryRoleStore, NullAuditLogger, PasswordPolicy, Principal, Privilege, PrivilegeCheck, Role,
    RoleStore, SecurityError, SecurityResult,
};

use crate::config::SecurityConfig;
use crate::error::Result;

/// Client address recorded for actions taken by the server itself.
pub const LOCAL_CLIENT: &str = "local";

/// A finished statement, as reported for auditing.
#[derive(Debug, Clone, Copy)]
pub struct QueryRecord<'a> {
    /// Executing user.
    pub username: &'a str,
    /// Client address.
    pub client_ip: &'a str,
    /// Current database, if any.
    pub database: Option<&'a str>,
    /// Statement text as received.
    pub statement: &'a str,
    /// Execution time.
    pub duration: Duration,
    /// Rows touched, when known.
    pub rows_affected: Option<u64>,
    /// Error message when execution failed.
    pub error: Option<&'a str>,
}

impl<'a> QueryRecord<'a> {
    /// A successful statement with no timing or row count.
    pub fn new(username: &'a str, client_ip: &'a str, statement: &'a str) -> Self {
        Self {
            username,
            client_ip,
            database: None,
            statement,
            duration: Duration::ZERO,
            rows_affected: None,
            error: None,
        }
    }
}

/// Security facade.
pub struct SecurityManager {
    config: SecurityConfig,
    users: Arc<dyn CredentialStore>,
    roles: Arc<dyn RoleStore>,
    authenticator: Authenticator,
    authorizer: Authorizer,
    audit: Arc<dyn AuditLogger>,
    password_policy: PasswordPolicy,
    bootstrap_lock: Mutex<()>,
}

impl SecurityManager {
    /// Build from configuration with empty in-memory stores.
    pub fn new(config: SecurityConfig) -> Result<Self> {
        Self::with_stores(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryRoleStore::new()),
        )
    }

    /// Build over caller-supplied stores.
    ///
    /// The audit logger follows the configuration: a file or stdout logger
    /// when auditing is enabled, a no-op logger otherwise.
    pub fn with_stores(
        config: SecurityConfig,
        users: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleStore>,
    ) -> Result<Self> {
        config.validate()?;
        let audit: Arc<dyn AuditLogger> = if config.enabled {
            Arc::new(FileAuditLogger::open(
                &config.audit.path,
                config.audit_logger_config(),
            )?)
        } else {
            Arc::new(NullAuditLogger)
        };
        Self::with_audit_logger(config, users, roles, audit)
    }

    /// Build over caller-supplied stores and audit logger.
    pub fn with_audit_logger(
        config: SecurityConfig,
        users: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let authenticator = Authenticator::with_policy(users.clone(), config.lockout_policy())
            .with_hash_cost(config.auth.bcrypt_cost);
        let authorizer = Authorizer::new(roles.clone());
        let password_policy = config.password_policy();

        tracing::info!(
            audit_enabled = config.enabled,
            audit_path = %config.audit.path,
            async_audit = config.audit.async_mode,
            max_attempts = config.auth.max_attempts,
            "security manager initialized"
        );

        Ok(Self {
            config,
            users,
            roles,
            authenticator,
            authorizer,
            audit,
            password_policy,
            bootstrap_lock: Mutex::new(()),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// The authenticator, for lockout inspection.
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    // ------------------------------------------------------------------
    // Per-connection and per-statement entry points
    // ------------------------------------------------------------------

    /// Verify credentials and audit the outcome.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        client_ip: &str,
    ) -> SecurityResult<Principal> {
        let result = self.authenticator.authenticate(username, password);
        let event = match &result {
            Ok(principal) => AuditEvent::authentication(principal.username.as_str(), client_ip, true),
            Err(e) => AuditEvent::authentication(username, client_ip, false).with_error(e.to_string()),
        };
        self.record(event);
        result
    }

    /// Check one requirement. Only denials are audited.
    pub fn check_privilege<I: Identity + ?Sized>(
        &self,
        identity: &I,
        client_ip: &str,
        database: &str,
        table: &str,
        required: Privilege,
    ) -> SecurityResult<()> {
        let result = self
            .authorizer
            .check_privilege(identity, database, table, required);
        if let Err(err) = &result {
            if let SecurityError::AccessDenied { object, .. } = err {
                self.record(
                    AuditEvent::authorization_denied(
                        identity.username(),
                        client_ip,
                        database,
                        object.as_str(),
                        required,
                    )
                    .with_error(err.to_string()),
                );
            }
        }
        result
    }

    /// Check requirements in order, stopping at and auditing the first denial.
    pub fn check_privileges<I: Identity + ?Sized>(
        &self,
        identity: &I,
        client_ip: &str,
        checks: &[PrivilegeCheck],
    ) -> SecurityResult<()> {
        checks.iter().try_for_each(|check| {
            self.check_privilege(
                identity,
                client_ip,
                &check.database,
                &check.table,
                check.required,
            )
        })
    }

    /// Audit an executed statement.
    pub fn audit_query(&self, query: QueryRecord<'_>) {
        let result = if query.error.is_some() {
            AuditResult::Failure
        } else {
            AuditResult::Success
        };
        let mut event = AuditEvent::new(
            AuditEventType::classify_statement(query.statement),
            result,
            query.username,
            query.client_ip,
        )
        .with_statement_limit(query.statement, self.config.audit.max_statement_length)
        .with_duration(query.duration);

        if let Some(database) = query.database {
            event = event.with_database(database);
        }
        if let Some(rows) = query.rows_affected {
            event = event.with_rows_affected(rows);
        }
        if let Some(error) = query.error {
            event = event.with_error(error);
        }
        self.record(event);
    }

    /// Audit a connection opening or closing.
    pub fn audit_connection(&self, username: &str, client_ip: &str, connected: bool) {
        self.record(AuditEvent::connection(username, client_ip, connected));
    }

    // ------------------------------------------------------------------
    // User administration
    // ------------------------------------------------------------------

    /// Create the first administrator. Refused once any user exists.
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> SecurityResult<Principal> {
        let guard = self.bootstrap_lock.lock();
        let result = if self.users.list_all().is_empty() {
            self.new_principal(username, password)
                .map(|p| p.with_privileges(Privilege::ALL))
                .and_then(|p| self.users.create(p.clone()).map(|()| p))
        } else {
            Err(SecurityError::AccessDenied {
                username: username.to_string(),
                privilege: Privilege::ADMIN.to_string(),
                object: "*.*".to_string(),
            })
        };
        drop(guard);
        if result.is_ok() {
            tracing::info!(username, "bootstrap administrator created");
        }
        self.audit_admin(username, LOCAL_CLIENT, "bootstrap_admin", username, result)
    }

    /// Create a user with no roles and no direct privileges.
    pub fn create_user(
        &self,
        actor: &Principal,
        client_ip: &str,
        username: &str,
        password: &str,
    ) -> SecurityResult<Principal> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self
            .new_principal(username, password)
            .and_then(|p| self.users.create(p.clone()).map(|()| p));
        self.audit_admin(&actor.username, client_ip, "create_user", username, result)
    }

    /// Delete a user and forget its failure history.
    pub fn drop_user(&self, actor: &Principal, client_ip: &str, username: &str) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self.users.delete(username);
        if result.is_ok() {
            self.authenticator.reset_failures(username);
        }
        self.audit_admin(&actor.username, client_ip, "drop_user", username, result)
    }

    /// Replace a password. Users may change their own; anyone else needs ADMIN.
    ///
    /// A new password clears any expiry.
    pub fn set_password(
        &self,
        actor: &Principal,
        client_ip: &str,
        username: &str,
        new_password: &str,
    ) -> SecurityResult<()> {
        if actor.key() != normalize_username(username) {
            self.require(actor, client_ip, Privilege::ADMIN)?;
        }
        let result = self.password_policy.validate(new_password).and_then(|()| {
            let hash = hash_password(new_password, self.config.auth.bcrypt_cost)?;
            self.modify_user(username, |p| {
                p.password_hash = hash;
                p.expires_at = None;
            })
        });
        self.audit_admin(&actor.username, client_ip, "set_password", username, result)
    }

    /// Set or clear the password expiry.
    pub fn set_password_expiry(
        &self,
        actor: &Principal,
        client_ip: &str,
        username: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self.modify_user(username, |p| p.expires_at = expires_at);
        self.audit_admin(&actor.username, client_ip, "set_password_expiry", username, result)
    }

    /// Set the explicit lock flag.
    pub fn lock_user(&self, actor: &Principal, client_ip: &str, username: &str) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self.modify_user(username, |p| p.locked = true);
        self.audit_admin(&actor.username, client_ip, "lock_user", username, result)
    }

    /// Clear the explicit lock flag and any failure-based lock.
    pub fn unlock_user(&self, actor: &Principal, client_ip: &str, username: &str) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self.modify_user(username, |p| p.locked = false);
        if result.is_ok() {
            self.authenticator.reset_failures(username);
        }
        self.audit_admin(&actor.username, client_ip, "unlock_user", username, result)
    }

    /// Forget a user's failed attempts without touching the lock flag.
    pub fn reset_failures(&self, actor: &Principal, client_ip: &str, username: &str) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        self.authenticator.reset_failures(username);
        self.audit_admin(&actor.username, client_ip, "reset_failures", username, Ok(()))
    }

    /// Every user, sorted by username.
    pub fn list_users(&self, actor: &Principal, client_ip: &str) -> SecurityResult<Vec<Principal>> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        Ok(self.users.list_all())
    }

    // ------------------------------------------------------------------
    // Roles and grants
    // ------------------------------------------------------------------

    /// Add an existing role to a user.
    ///
    /// Handing out a role that carries global ADMIN needs ADMIN.
    pub fn grant_role(
        &self,
        actor: &Principal,
        client_ip: &str,
        username: &str,
        role_name: &str,
    ) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::GRANT)?;
        let role = match self.roles.get_by_name(role_name) {
            Some(role) => role,
            None => {
                let result = Err(SecurityError::RoleNotFound(role_name.to_string()));
                return self.audit_admin(&actor.username, client_ip, "grant_role", username, result);
            }
        };
        if role.global.has(Privilege::ADMIN) {
            self.require(actor, client_ip, Privilege::ADMIN)?;
        }
        let result = self.modify_user(username, |p| {
            p.roles.insert(role.name.clone());
        });
        self.audit_admin(
            &actor.username,
            client_ip,
            "grant_role",
            format!("{} -> {}", role_name, username),
            result,
        )
    }

    /// Remove a role from a user. Removing a role the user lacks is a no-op.
    pub fn revoke_role(
        &self,
        actor: &Principal,
        client_ip: &str,
        username: &str,
        role_name: &str,
    ) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::GRANT)?;
        let result = self.modify_user(username, |p| {
            p.roles.remove(role_name);
        });
        self.audit_admin(
            &actor.username,
            client_ip,
            "revoke_role",
            format!("{} -> {}", role_name, username),
            result,
        )
    }

    /// Register a role.
    pub fn create_role(&self, actor: &Principal, client_ip: &str, role: Role) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let name = role.name.clone();
        let result = self.roles.create(role);
        self.audit_admin(&actor.username, client_ip, "create_role", name, result)
    }

    /// Delete a role. Users still naming it simply stop matching it.
    pub fn drop_role(&self, actor: &Principal, client_ip: &str, name: &str) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        let result = self.roles.delete(name);
        self.audit_admin(&actor.username, client_ip, "drop_role", name, result)
    }

    /// Add privileges to a role at a scope.
    ///
    /// The actor needs GRANT and must itself hold `privileges` at `scope`.
    pub fn grant_privilege(
        &self,
        actor: &Principal,
        client_ip: &str,
        role_name: &str,
        scope: GrantScope,
        privileges: Privilege,
    ) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::GRANT)?;
        let (database, table) = scope_parts(&scope);
        self.check_privilege(actor, client_ip, database, table, privileges)?;

        let object = format!("{} ON {}", privileges, scope);
        let result = self.modify_role(role_name, |role| role.grant(scope, privileges));
        let event = AuditEvent::admin(actor.username.as_str(), client_ip, "grant_privilege", object)
            .with_privilege(privileges)
            .with_extra("role", role_name);
        self.finish_admin(event, result)
    }

    /// Remove privileges from a role at a scope.
    pub fn revoke_privilege(
        &self,
        actor: &Principal,
        client_ip: &str,
        role_name: &str,
        scope: GrantScope,
        privileges: Privilege,
    ) -> SecurityResult<()> {
        self.require(actor, client_ip, Privilege::GRANT)?;
        let object = format!("{} ON {}", privileges, scope);
        let result = self.modify_role(role_name, |role| role.revoke(&scope, privileges));
        let event = AuditEvent::admin(actor.username.as_str(), client_ip, "revoke_privilege", object)
            .with_privilege(privileges)
            .with_extra("role", role_name);
        self.finish_admin(event, result)
    }

    /// Every role, sorted by name.
    pub fn list_roles(&self, actor: &Principal, client_ip: &str) -> SecurityResult<Vec<Role>> {
        self.require(actor, client_ip, Privilege::ADMIN)?;
        Ok(self.roles.list_all())
    }

    // ------------------------------------------------------------------
    // Runtime tuning and lifecycle
    // ------------------------------------------------------------------

    /// Change the failure threshold for subsequent attempts.
    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.authenticator.set_max_attempts(max_attempts);
    }

    /// Change the lock duration for subsequent attempts.
    pub fn set_lock_duration(&self, duration: Duration) {
        self.authenticator.set_lock_duration(duration);
    }

    /// Flush buffered audit events without closing the pipeline.
    pub fn flush(&self) -> SecurityResult<()> {
        self.audit.flush()
    }

    /// Drain and close the audit pipeline.
    pub fn shutdown(self) -> Result<()> {
        tracing::info!("security manager shutting down");
        self.audit.close()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn record(&self, event: AuditEvent) {
        if self.config.enabled {
            self.audit.log(event);
        }
    }

    fn require(&self, actor: &Principal, client_ip: &str, required: Privilege) -> SecurityResult<()> {
        self.check_privilege(actor, client_ip, "", "", required)
    }

    fn new_principal(&self, username: &str, password: &str) -> SecurityResult<Principal> {
        self.password_policy.validate(password)?;
        let hash = hash_password(password, self.config.auth.bcrypt_cost)?;
        Ok(Principal::new(username, hash))
    }

    fn modify_user(&self, username: &str, change: impl FnOnce(&mut Principal)) -> SecurityResult<()> {
        let mut principal = self
            .users
            .get_by_username(username)
            .ok_or_else(|| SecurityError::UserNotFound(username.to_string()))?;
        change(&mut principal);
        self.users.update(principal)
    }

    fn modify_role(&self, name: &str, change: impl FnOnce(&mut Role)) -> SecurityResult<()> {
        let mut role = self
            .roles
            .get_by_name(name)
            .ok_or_else(|| SecurityError::RoleNotFound(name.to_string()))?;
        change(&mut role);
        self.roles.update(role)
    }

    fn audit_admin<T>(
        &self,
        actor: &str,
        client_ip: &str,
        action: &str,
        object: impl Into<String>,
        result: SecurityResult<T>,
    ) -> SecurityResult<T> {
        self.finish_admin(AuditEvent::admin(actor, client_ip, action, object), result)
    }

    fn finish_admin<T>(&self, mut event: AuditEvent, result: SecurityResult<T>) -> SecurityResult<T> {
        if let Err(e) = &result {
            event = event.with_result(AuditResult::Failure).with_error(e.to_string());
        }
        self.record(event);
        result
    }
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager")
            .field("config", &self.config)
            .field("lockout", &self.authenticator.policy())
            .finish_non_exhaustive()
    }
}

fn scope_parts(scope: &GrantScope) -> (&str, &str) {
    match scope {
        GrantScope::Global => ("", ""),
        GrantScope::Database(db) => (db.as_str(), ""),
        GrantScope::Table(db, table) => (db.as_str(), table.as_str()),
    }
}
