//! Roles: named privilege bundles at global, database, and table scope.
//!
//! Scopes are independent. A database grant says nothing about other
//! databases, and a table grant says nothing about sibling tables.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::privilege::Privilege;

/// Where a grant applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantScope {
    /// Every database and table.
    Global,
    /// One database.
    Database(String),
    /// One table in one database.
    Table(String, String),
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantScope::Global => write!(f, "*.*"),
            GrantScope::Database(db) => write!(f, "{}.*", db),
            GrantScope::Table(db, table) => write!(f, "{}.{}", db, table),
        }
    }
}

/// A named bundle of privileges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: String,
    /// Privileges that apply everywhere.
    pub global: Privilege,
    /// Database name -> privileges.
    pub databases: HashMap<String, Privilege>,
    /// Database name -> table name -> privileges.
    pub tables: HashMap<String, HashMap<String, Privilege>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create an empty role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            global: Privilege::NONE,
            databases: HashMap::new(),
            tables: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder form of [`Role::grant`].
    pub fn with_grant(mut self, scope: GrantScope, privileges: Privilege) -> Self {
        self.grant(scope, privileges);
        self
    }

    /// Add privileges at a scope.
    pub fn grant(&mut self, scope: GrantScope, privileges: Privilege) {
        match scope {
            GrantScope::Global => self.global |= privileges,
            GrantScope::Database(db) => *self.databases.entry(db).or_default() |= privileges,
            GrantScope::Table(db, table) => {
                *self
                    .tables
                    .entry(db)
                    .or_default()
                    .entry(table)
                    .or_default() |= privileges
            }
        }
    }

    /// Remove privileges at a scope. Other scopes are untouched.
    pub fn revoke(&mut self, scope: &GrantScope, privileges: Privilege) {
        match scope {
            GrantScope::Global => self.global = self.global - privileges,
            GrantScope::Database(db) => {
                if let Some(p) = self.databases.get_mut(db) {
                    *p = *p - privileges;
                    if p.is_empty() {
                        self.databases.remove(db);
                    }
                }
            }
            GrantScope::Table(db, table) => {
                if let Some(tables) = self.tables.get_mut(db) {
                    if let Some(p) = tables.get_mut(table) {
                        *p = *p - privileges;
                        if p.is_empty() {
                            tables.remove(table);
                        }
                    }
                    if tables.is_empty() {
                        self.tables.remove(db);
                    }
                }
            }
        }
    }

    /// Privileges granted at database scope for `database`.
    pub fn database_privileges(&self, database: &str) -> Privilege {
        self.databases.get(database).copied().unwrap_or_default()
    }

    /// Privileges granted at table scope for `database`.`table`.
    pub fn table_privileges(&self, database: &str, table: &str) -> Privilege {
        self.tables
            .get(database)
            .and_then(|tables| tables.get(table))
            .copied()
            .unwrap_or_default()
    }

    /// Whether any single scope of this role covers `required`.
    ///
    /// Global, database, and table grants are checked one at a time; they are
    /// never merged to satisfy a request.
    pub fn allows(&self, database: &str, table: &str, required: Privilege) -> bool {
        self.global.has(required)
            || (!database.is_empty() && self.database_privileges(database).has(required))
            || (!database.is_empty()
                && !table.is_empty()
                && self.table_privileges(database, table).has(required))
    }
}
