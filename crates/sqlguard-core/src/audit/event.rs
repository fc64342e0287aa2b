//! Audit event records.
//!
//! One event serializes to one JSON object per line. Optional fields are
//! omitted when unset.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::statement::{normalize_statement, DEFAULT_MAX_STATEMENT_LENGTH};
use crate::privilege::Privilege;

/// Category of a security-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Login attempt.
    Authentication,
    /// Privilege check.
    Authorization,
    /// Read query.
    Query,
    /// Schema change.
    Ddl,
    /// Row modification.
    Dml,
    /// User, role, or grant administration.
    Admin,
    /// Connection opened or closed.
    Connection,
}

impl AuditEventType {
    /// Classify a statement by its leading keyword.
    ///
    /// This is a keyword match, not a parse. Anything unrecognized is a query.
    pub fn classify_statement(sql: &str) -> Self {
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_start_matches('(')
            .to_ascii_uppercase();
        match keyword.as_str() {
            "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "MERGE" | "UPSERT" => Self::Dml,
            "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "RENAME" => Self::Ddl,
            "GRANT" | "REVOKE" => Self::Admin,
            _ => Self::Query,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Query => "QUERY",
            Self::Ddl => "DDL",
            Self::Dml => "DML",
            Self::Admin => "ADMIN",
            Self::Connection => "CONNECTION",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTHENTICATION" => Ok(Self::Authentication),
            "AUTHORIZATION" => Ok(Self::Authorization),
            "QUERY" => Ok(Self::Query),
            "DDL" => Ok(Self::Ddl),
            "DML" => Ok(Self::Dml),
            "ADMIN" => Ok(Self::Admin),
            "CONNECTION" => Ok(Self::Connection),
            other => Err(format!("unknown audit event type: {}", other)),
        }
    }
}

/// Outcome recorded on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
    /// Operation was refused by access control.
    Denied,
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditResult::Success => write!(f, "SUCCESS"),
            AuditResult::Failure => write!(f, "FAILURE"),
            AuditResult::Denied => write!(f, "DENIED"),
        }
    }
}

impl FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "DENIED" => Ok(Self::Denied),
            other => Err(format!("unknown audit result: {}", other)),
        }
    }
}

/// An immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub event_type: AuditEventType,
    /// Outcome.
    pub result: AuditResult,
    /// Acting user, or the requested username for failed logins.
    pub username: String,
    /// Client address.
    pub client_ip: String,
    /// Target database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Normalized statement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    /// Target object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Privilege involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege: Option<String>,
    /// Error message for failures and denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Rows touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Free-form structured fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, serde_json::Value>>,
}

impl AuditEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        event_type: AuditEventType,
        result: AuditResult,
        username: impl Into<String>,
        client_ip: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            result,
            username: username.into(),
            client_ip: client_ip.into(),
            database: None,
            statement: None,
            object: None,
            privilege: None,
            error_msg: None,
            duration_ms: None,
            rows_affected: None,
            extra: None,
        }
    }

    /// Login attempt.
    pub fn authentication(
        username: impl Into<String>,
        client_ip: impl Into<String>,
        success: bool,
    ) -> Self {
        let result = if success {
            AuditResult::Success
        } else {
            AuditResult::Failure
        };
        Self::new(AuditEventType::Authentication, result, username, client_ip)
    }

    /// Refused privilege check.
    pub fn authorization_denied(
        username: impl Into<String>,
        client_ip: impl Into<String>,
        database: &str,
        object: impl Into<String>,
        privilege: Privilege,
    ) -> Self {
        let mut event = Self::new(
            AuditEventType::Authorization,
            AuditResult::Denied,
            username,
            client_ip,
        )
        .with_object(object)
        .with_privilege(privilege);
        if !database.is_empty() {
            event.database = Some(database.to_string());
        }
        event
    }

    /// Executed statement, categorized by its leading keyword.
    pub fn query(
        username: impl Into<String>,
        client_ip: impl Into<String>,
        statement: &str,
        success: bool,
    ) -> Self {
        let result = if success {
            AuditResult::Success
        } else {
            AuditResult::Failure
        };
        Self::new(
            AuditEventType::classify_statement(statement),
            result,
            username,
            client_ip,
        )
        .with_statement(statement)
    }

    /// Administrative action on `object`.
    pub fn admin(
        username: impl Into<String>,
        client_ip: impl Into<String>,
        action: &str,
        object: impl Into<String>,
    ) -> Self {
        Self::new(AuditEventType::Admin, AuditResult::Success, username, client_ip)
            .with_object(object)
            .with_extra("action", action)
    }

    /// Connection opened (`connected == true`) or closed.
    pub fn connection(
        username: impl Into<String>,
        client_ip: impl Into<String>,
        connected: bool,
    ) -> Self {
        let state = if connected { "open" } else { "close" };
        Self::new(
            AuditEventType::Connection,
            AuditResult::Success,
            username,
            client_ip,
        )
        .with_extra("state", state)
    }

    /// Set the target database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Attach statement text, normalized and capped at the default length.
    pub fn with_statement(self, sql: &str) -> Self {
        self.with_statement_limit(sql, DEFAULT_MAX_STATEMENT_LENGTH)
    }

    /// Attach statement text, normalized and capped at `max_len` characters.
    pub fn with_statement_limit(mut self, sql: &str, max_len: usize) -> Self {
        self.statement = Some(normalize_statement(sql, max_len));
        self
    }

    /// Set the target object.
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Record the privilege involved.
    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege.to_string());
        self
    }

    /// Override the result.
    pub fn with_result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    /// Record an error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_msg = Some(message.into());
        self
    }

    /// Record execution time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Record rows touched.
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = Some(rows);
        self
    }

    /// Add a structured field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Serialize to a single JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statement() {
        assert_eq!(
            AuditEventType::classify_statement("select * from t"),
            AuditEventType::Query
        );
        assert_eq!(
            AuditEventType::classify_statement("  INSERT INTO t VALUES (1)"),
            AuditEventType::Dml
        );
        assert_eq!(
            AuditEventType::classify_statement("drop table t"),
            AuditEventType::Ddl
        );
        assert_eq!(
            AuditEventType::classify_statement("GRANT read ON db.* TO bob"),
            AuditEventType::Admin
        );
        assert_eq!(AuditEventType::classify_statement(""), AuditEventType::Query);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("ddl".parse::<AuditEventType>().unwrap(), AuditEventType::Ddl);
        assert_eq!("Denied".parse::<AuditResult>().unwrap(), AuditResult::Denied);
        assert!("LOGIN".parse::<AuditEventType>().is_err());
    }

    #[test]
    fn test_duration_saturates() {
        let event = AuditEvent::query("bob", "10.0.0.3", "SELECT 1", true).with_duration(Duration::MAX);
        assert_eq!(event.duration_ms, Some(u64::MAX));
    }

    #[test]
    fn test_json_field_names() {
        let event = AuditEvent::authentication("alice", "10.0.0.2", false)
            .with_error("authentication failed");
        let line = event.to_json_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["event_type"], "AUTHENTICATION");
        assert_eq!(value["result"], "FAILURE");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["client_ip"], "10.0.0.2");
        assert_eq!(value["error_msg"], "authentication failed");
        assert!(value.get("database").is_none());
        assert!(value.get("extra").is_none());
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_denied_event() {
        let event = AuditEvent::authorization_denied(
            "bob",
            "10.0.0.3",
            "db1",
            "db1.t1",
            Privilege::DELETE,
        );
        assert_eq!(event.event_type, AuditEventType::Authorization);
        assert_eq!(event.result, AuditResult::Denied);
        assert_eq!(event.database.as_deref(), Some("db1"));
        assert_eq!(event.privilege.as_deref(), Some("delete"));
    }

    #[test]
    fn test_query_event_normalizes_statement() {
        let event = AuditEvent::query("bob", "10.0.0.3", "UPDATE t\n   SET a = 1", true)
            .with_duration(Duration::from_millis(12))
            .with_rows_affected(3);
        assert_eq!(event.event_type, AuditEventType::Dml);
        assert_eq!(event.statement.as_deref(), Some("UPDATE t SET a = 1"));
        assert_eq!(event.duration_ms, Some(12));
        assert_eq!(event.rows_affected, Some(3));
    }

    #[test]
    fn test_decodes_what_it_encodes() {
        let event = AuditEvent::admin("root", "127.0.0.1", "create_user", "alice")
            .with_database("db1");
        let line = event.to_json_line().unwrap();
        let back: AuditEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }
}
