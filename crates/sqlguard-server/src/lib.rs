//! SQLGuard Server library.
//!
//! This crate wires the security core into the SQL server: configuration
//! loading and the [`SecurityManager`] facade the server calls per connection
//! and per statement.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{AuditConfig, AuthConfig, ConfigArgs, SecurityConfig};
pub use error::{Error, Result};
pub use manager::{QueryRecord, SecurityManager, LOCAL_CLIENT};
