//! Integration tests for the authentication, authorization, and audit pipeline.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlguard_core::audit::{get_events, AuditLoggerConfig};
use sqlguard_core::{
    hash_password, AuditEvent, AuditEventType, AuditLogger, AuditResult, Authenticator,
    Authorizer, CredentialStore, FileAuditLogger, GrantScope, MemoryCredentialStore,
    MemoryRoleStore, Principal, Privilege, Role, RoleStore, SecurityError,
};

const TEST_COST: u32 = 4;

struct TestContext {
    users: Arc<MemoryCredentialStore>,
    roles: Arc<MemoryRoleStore>,
    authenticator: Authenticator,
    authorizer: Authorizer,
}

impl TestContext {
    fn new() -> Self {
        let users = Arc::new(MemoryCredentialStore::new());
        let roles = Arc::new(MemoryRoleStore::new());
        Self {
            authenticator: Authenticator::new(users.clone()),
            authorizer: Authorizer::new(roles.clone()),
            users,
            roles,
        }
    }

    fn add_user(&self, username: &str, password: &str, roles: &[&str]) {
        let principal = Principal::new(username, hash_password(password, TEST_COST).unwrap())
            .with_roles(roles.iter().copied());
        self.users.create(principal).unwrap();
    }
}

#[test]
fn test_alice_lockout_scenario() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "secret123", &[]);
    ctx.authenticator.set_max_attempts(3);

    assert!(ctx.authenticator.authenticate("alice", "secret123").is_ok());
    for _ in 0..3 {
        assert!(matches!(
            ctx.authenticator.authenticate("alice", "wrong"),
            Err(SecurityError::AuthenticationFailed)
        ));
    }
    assert!(matches!(
        ctx.authenticator.authenticate("alice", "secret123"),
        Err(SecurityError::AccountLocked(_))
    ));
}

#[test]
fn test_bob_readonly_scenario() {
    let ctx = TestContext::new();
    ctx.roles
        .create(Role::new("readonly").with_grant(GrantScope::Global, Privilege::parse("select")))
        .unwrap();
    ctx.add_user("bob", "hunter22", &["readonly"]);

    let bob = ctx.authenticator.authenticate("bob", "hunter22").unwrap();
    assert!(ctx
        .authorizer
        .check_privilege(&bob, "db1", "t1", Privilege::READ)
        .is_ok());
    assert!(matches!(
        ctx.authorizer
            .check_privilege(&bob, "db1", "t1", Privilege::DELETE),
        Err(SecurityError::AccessDenied { .. })
    ));
}

#[test]
fn test_role_changes_apply_to_next_check() {
    let ctx = TestContext::new();
    ctx.roles.create(Role::new("writer")).unwrap();
    ctx.add_user("carol", "password1", &["writer"]);
    let carol = ctx.users.get_by_username("carol").unwrap();

    assert!(ctx
        .authorizer
        .check_privilege(&carol, "app", "orders", Privilege::INSERT)
        .is_err());

    let mut writer = ctx.roles.get_by_name("writer").unwrap();
    writer.grant(
        GrantScope::Table("app".into(), "orders".into()),
        Privilege::INSERT,
    );
    ctx.roles.update(writer).unwrap();

    assert!(ctx
        .authorizer
        .check_privilege(&carol, "app", "orders", Privilege::INSERT)
        .is_ok());
    assert!(ctx
        .authorizer
        .check_privilege(&carol, "app", "customers", Privilege::INSERT)
        .is_err());
}

#[test]
fn test_excluded_ip_scenario_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let path_str = path.to_str().unwrap();

    let logger = FileAuditLogger::open(
        path_str,
        AuditLoggerConfig::default().with_exclude_ips(["10.0.0.1"]),
    )
    .unwrap();
    logger.log(AuditEvent::authentication("alice", "10.0.0.1", true));
    logger.log(AuditEvent::authentication("alice", "10.0.0.2", true));
    logger.close().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains("10.0.0.2"));
}

#[test]
fn test_logged_events_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let start = Utc::now() - Duration::seconds(1);

    let logger = FileAuditLogger::open(
        path.to_str().unwrap(),
        AuditLoggerConfig::default().with_async(8),
    )
    .unwrap();
    let written = vec![
        AuditEvent::authentication("alice", "10.0.0.2", true),
        AuditEvent::authorization_denied("bob", "10.0.0.3", "db1", "db1.t1", Privilege::DELETE),
        AuditEvent::query("alice", "10.0.0.2", "SELECT   *\nFROM t1", true).with_rows_affected(4),
    ];
    for event in &written {
        logger.log(event.clone());
    }
    logger.close().unwrap();

    let events = get_events(&path, start, Utc::now() + Duration::seconds(1)).unwrap();
    assert_eq!(events.len(), written.len());
    for (read, original) in events.iter().zip(&written) {
        assert_eq!(read.username, original.username);
        assert_eq!(read.event_type, original.event_type);
        assert_eq!(read.result, original.result);
    }
    assert_eq!(events[1].result, AuditResult::Denied);
    assert_eq!(events[2].event_type, AuditEventType::Query);
    assert_eq!(events[2].statement.as_deref(), Some("SELECT * FROM t1"));
}
