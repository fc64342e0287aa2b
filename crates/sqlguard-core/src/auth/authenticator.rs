//! Credential verification with failure-counting lockout.
//!
//! Attempt records live only in memory. They are created on the first
//! failure, removed on success or reset, and treated as expired once the
//! lock window has passed since the last failure. Expiry is evaluated lazily
//! on the next access for that username, and every [`PRUNE_INTERVAL`]
//! failures the whole table is swept; there is no background timer.
//!
//! Unknown usernames are verified against a dummy hash at the configured
//! cost, so both failure paths pay for one bcrypt verification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::password::{hash_password, verify_password, DEFAULT_BCRYPT_COST};
use crate::error::{SecurityError, SecurityResult};
use crate::store::{normalize_username, CredentialStore, Principal};

/// Default number of consecutive failures before an account is locked.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout window.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(15 * 60);

/// Recorded failures between sweeps of expired attempt records.
pub const PRUNE_INTERVAL: u64 = 1024;

/// Lockout thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lock.
    pub max_attempts: u32,
    /// How long a lock lasts after the last failure.
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_duration: DEFAULT_LOCK_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    failures: u32,
    last_failure: Instant,
}

impl AttemptRecord {
    fn expired(&self, window: Duration) -> bool {
        self.last_failure.elapsed() >= window
    }
}

/// Verifies username/password pairs against a credential store.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    attempts: DashMap<String, AttemptRecord>,
    policy: RwLock<LockoutPolicy>,
    hash_cost: u32,
    dummy_hash: OnceLock<String>,
    failures_since_prune: AtomicU64,
    verifications: AtomicU64,
}

impl Authenticator {
    /// Create an authenticator with the default lockout policy.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_policy(store, LockoutPolicy::default())
    }

    /// Create an authenticator with a custom lockout policy.
    pub fn with_policy(store: Arc<dyn CredentialStore>, policy: LockoutPolicy) -> Self {
        let authenticator = Self {
            store,
            attempts: DashMap::new(),
            policy: RwLock::new(LockoutPolicy::default()),
            hash_cost: DEFAULT_BCRYPT_COST,
            dummy_hash: OnceLock::new(),
            failures_since_prune: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
        };
        authenticator.set_max_attempts(policy.max_attempts);
        authenticator.set_lock_duration(policy.lock_duration);
        authenticator
    }

    /// Match the bcrypt cost used for stored hashes, so unknown-user
    /// verification takes as long as a real one.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self.dummy_hash = OnceLock::new();
        self
    }

    /// Authenticate a user.
    ///
    /// Checks run in a fixed order: rate-limit lock, lookup, explicit lock,
    /// password, expiry. Expiry is only reported once the password has
    /// verified, so it reveals nothing to a caller without the password.
    pub fn authenticate(&self, username: &str, password: &str) -> SecurityResult<Principal> {
        let key = normalize_username(username);
        let policy = self.policy();

        if self.check_lockout(&key, policy) {
            tracing::debug!(username, "login rejected, account is rate-limited");
            return Err(SecurityError::AccountLocked(username.to_string()));
        }

        // Unknown users are verified and counted like wrong passwords so the
        // two cases cannot be told apart.
        let Some(principal) = self.store.get_by_username(username) else {
            self.verify(password, self.dummy_hash());
            self.record_failure(&key, policy);
            return Err(SecurityError::AuthenticationFailed);
        };

        if principal.locked {
            tracing::debug!(username, "login rejected, account is administratively locked");
            return Err(SecurityError::AccountLocked(principal.username));
        }

        if !self.verify(password, &principal.password_hash) {
            self.record_failure(&key, policy);
            return Err(SecurityError::AuthenticationFailed);
        }

        if principal.is_expired(Utc::now()) {
            return Err(SecurityError::PasswordExpired(principal.username));
        }

        self.attempts.remove(&key);
        tracing::debug!(username, "authenticated");
        Ok(principal)
    }

    /// Current lockout policy.
    pub fn policy(&self) -> LockoutPolicy {
        *self.policy.read()
    }

    /// Change the failure threshold. Values below one are raised to one.
    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.policy.write().max_attempts = max_attempts.max(1);
    }

    /// Change the lockout window.
    pub fn set_lock_duration(&self, lock_duration: Duration) {
        self.policy.write().lock_duration = lock_duration;
    }

    /// Clear any failure record for `username`.
    pub fn reset_failures(&self, username: &str) {
        if self.attempts.remove(&normalize_username(username)).is_some() {
            tracing::info!(username, "login failures reset");
        }
    }

    /// Whether `username` is currently rate-limited. Does not clear state.
    pub fn is_locked(&self, username: &str) -> bool {
        let policy = self.policy();
        self.attempts
            .get(&normalize_username(username))
            .is_some_and(|r| !r.expired(policy.lock_duration) && r.failures >= policy.max_attempts)
    }

    /// Failures counted inside the current window.
    pub fn failed_attempts(&self, username: &str) -> u32 {
        let policy = self.policy();
        self.attempts
            .get(&normalize_username(username))
            .filter(|r| !r.expired(policy.lock_duration))
            .map(|r| r.failures)
            .unwrap_or(0)
    }

    /// Drop every attempt record whose window has elapsed. Returns how many
    /// were removed.
    pub fn prune_expired(&self) -> usize {
        let window = self.policy().lock_duration;
        let before = self.attempts.len();
        self.attempts.retain(|_, record| !record.expired(window));
        let removed = before.saturating_sub(self.attempts.len());
        if removed > 0 {
            tracing::debug!(removed, "pruned expired login attempt records");
        }
        removed
    }

    /// Usernames with a live or not yet swept attempt record.
    pub fn tracked_accounts(&self) -> usize {
        self.attempts.len()
    }

    fn verify(&self, password: &str, password_hash: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        verify_password(password, password_hash)
    }

    fn dummy_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            hash_password("sqlguard-unknown-user", self.hash_cost).unwrap_or_else(|e| {
                tracing::error!(error = %e, cost = self.hash_cost, "failed to compute dummy password hash");
                String::new()
            })
        })
    }

    /// True if locked. Drops the record when its window has elapsed.
    fn check_lockout(&self, key: &str, policy: LockoutPolicy) -> bool {
        match self.attempts.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                if entry.get().expired(policy.lock_duration) {
                    entry.remove();
                    false
                } else {
                    entry.get().failures >= policy.max_attempts
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    fn record_failure(&self, key: &str, policy: LockoutPolicy) -> u32 {
        let now = Instant::now();
        let failures = {
            let mut record = self
                .attempts
                .entry(key.to_string())
                .or_insert(AttemptRecord {
                    failures: 0,
                    last_failure: now,
                });
            if record.expired(policy.lock_duration) {
                record.failures = 0;
            }
            record.failures = record.failures.saturating_add(1);
            record.last_failure = now;
            record.failures
        };

        if self.failures_since_prune.fetch_add(1, Ordering::Relaxed) + 1 >= PRUNE_INTERVAL {
            self.failures_since_prune.store(0, Ordering::Relaxed);
            self.prune_expired();
        }

        if failures == policy.max_attempts {
            tracing::warn!(
                username = key,
                failures,
                lock_secs = policy.lock_duration.as_secs(),
                "account locked after repeated login failures"
            );
        }
        failures
    }
}
