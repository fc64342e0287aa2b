//! Security configuration.
//!
//! Settings come from a TOML file, from command-line flags layered on top,
//! or from the builder methods when the server embeds the facade directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args as ClapArgs;
use serde::{Deserialize, Serialize};
use sqlguard_core::audit::{AuditLoggerConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_STATEMENT_LENGTH};
use sqlguard_core::auth::{
    DEFAULT_BCRYPT_COST, DEFAULT_LOCK_DURATION, DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_PASSWORD_LENGTH,
};
use sqlguard_core::{LockoutPolicy, PasswordPolicy};

use crate::error::{Error, Result};

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Audit log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Log file path. Empty or "stdout" writes to standard output.
    pub path: String,

    /// Hand events to a background writer thread.
    pub async_mode: bool,

    /// Capacity of the async queue, in events.
    pub buffer_size: usize,

    /// Client addresses whose events are never written.
    pub exclude_ips: Vec<String>,

    /// Statement text is cut to this many characters.
    pub max_statement_length: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            async_mode: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            exclude_ips: Vec::new(),
            max_statement_length: DEFAULT_MAX_STATEMENT_LENGTH,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Consecutive failures before an account is locked.
    pub max_attempts: u32,

    /// Lock duration in seconds.
    pub lock_duration_secs: u64,

    /// bcrypt work factor for new hashes.
    pub bcrypt_cost: u32,

    /// Minimum password length in characters.
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_duration_secs: DEFAULT_LOCK_DURATION.as_secs(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

/// SQLGuard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Audit logging switch. Authentication and authorization always apply.
    pub enabled: bool,

    /// Audit log settings.
    pub audit: AuditConfig,

    /// Authentication settings.
    pub auth: AuthConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            audit: AuditConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl SecurityConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: SecurityConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(Error::Config(format!(
                "bcrypt_cost must be between {} and {}, got {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST, self.auth.bcrypt_cost
            )));
        }
        if self.auth.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.audit.async_mode && self.audit.buffer_size == 0 {
            return Err(Error::Config(
                "buffer_size must be at least 1 in async mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn audit logging off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the audit log path.
    pub fn with_audit_path(mut self, path: impl Into<String>) -> Self {
        self.audit.path = path.into();
        self
    }

    /// Enable async audit delivery with the given queue capacity.
    pub fn with_async_audit(mut self, buffer_size: usize) -> Self {
        self.audit.async_mode = true;
        self.audit.buffer_size = buffer_size;
        self
    }

    /// Never audit events from these client addresses.
    pub fn with_exclude_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audit.exclude_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    /// Set the audited statement length cap.
    pub fn with_max_statement_length(mut self, max_len: usize) -> Self {
        self.audit.max_statement_length = max_len;
        self
    }

    /// Set the failure threshold.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.auth.max_attempts = max_attempts;
        self
    }

    /// Set the lock duration.
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.auth.lock_duration_secs = duration.as_secs();
        self
    }

    /// Set the bcrypt work factor.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.auth.bcrypt_cost = cost;
        self
    }

    /// Set the minimum password length.
    pub fn with_min_password_length(mut self, min_length: usize) -> Self {
        self.auth.min_password_length = min_length;
        self
    }

    /// Lock duration as a [`Duration`].
    pub fn lock_duration(&self) -> Duration {
        Duration::from_secs(self.auth.lock_duration_secs)
    }

    /// Settings for the audit logger.
    pub fn audit_logger_config(&self) -> AuditLoggerConfig {
        let config = AuditLoggerConfig::default().with_exclude_ips(self.audit.exclude_ips.clone());
        if self.audit.async_mode {
            config.with_async(self.audit.buffer_size)
        } else {
            config
        }
    }

    /// Lockout thresholds for the authenticator.
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.auth.max_attempts,
            lock_duration: self.lock_duration(),
        }
    }

    /// Rules for new passwords.
    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::with_min_length(self.auth.min_password_length)
    }
}

/// Command-line overrides for [`SecurityConfig`].
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Audit log path ("stdout" for standard output).
    #[arg(long)]
    pub audit_path: Option<String>,

    /// Deliver audit events from a background thread.
    #[arg(long)]
    pub async_audit: bool,

    /// Async audit queue capacity.
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Client address to exclude from auditing (repeatable).
    #[arg(long = "exclude-ip")]
    pub exclude_ips: Vec<String>,

    /// Failed logins before an account locks.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Lock duration in seconds.
    #[arg(long)]
    pub lock_duration: Option<u64>,

    /// Disable audit logging.
    #[arg(long)]
    pub no_audit: bool,
}

impl ConfigArgs {
    /// Load the configured file, if any, and apply flag overrides.
    pub fn into_config(self) -> Result<SecurityConfig> {
        let mut config = match &self.config {
            Some(path) => SecurityConfig::load(path)?,
            None => SecurityConfig::default(),
        };

        if let Some(path) = self.audit_path {
            config.audit.path = path;
        }
        if self.async_audit {
            config.audit.async_mode = true;
        }
        if let Some(size) = self.buffer_size {
            config.audit.buffer_size = size;
        }
        if !self.exclude_ips.is_empty() {
            config.audit.exclude_ips = self.exclude_ips;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.auth.max_attempts = max_attempts;
        }
        if let Some(secs) = self.lock_duration {
            config.auth.lock_duration_secs = secs;
        }
        if self.no_audit {
            config.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}
