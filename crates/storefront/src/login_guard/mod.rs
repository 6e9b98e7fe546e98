//! Brute-force protection for the login form.
//!
//! Counts failed logins per client and locks the client out once the limit is
//! reached inside the attempt window.
//!
//! # States
//!
//! ```text
//! Clean --failure--> Accumulating(1)
//! Accumulating(n) --failure, n + 1 < max--> Accumulating(n + 1)
//! Accumulating(max - 1) --failure--> Locked
//! Locked --lockout elapsed--> Clean
//! Accumulating(n) --window elapsed since first failure--> Clean
//! any --success (clear)--> Clean
//! ```
//!
//! # Storage
//!
//! State lives in an [`AttemptStore`] under two keys: [`ATTEMPTS_KEY`] holds
//! `{"attempts": n, "firstAttempt": <epoch ms>}` and [`LOCKOUT_KEY`] holds
//! the lockout expiry in epoch milliseconds. Storage failures and malformed
//! values are logged and read as "no record", so a broken store never blocks
//! a legitimate login.

mod registry;
mod store;

pub use registry::GuardRegistry;
pub use store::{AttemptStore, MemoryStore, StorageError};

use aodai_core::{Clock, SystemClock};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Storage key for the attempt counter.
pub const ATTEMPTS_KEY: &str = "login_attempts";

/// Storage key for the lockout expiry.
pub const LOCKOUT_KEY: &str = "login_lockout_until";

/// Limits applied by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lockout.
    pub max_attempts: u32,
    /// Failures older than this (measured from the first) are forgotten.
    pub attempt_window: TimeDelta,
    /// How long a lockout lasts.
    pub lockout_duration: TimeDelta,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: TimeDelta::minutes(5),
            lockout_duration: TimeDelta::minutes(15),
        }
    }
}

/// Where a client currently sits in the lockout state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Clean,
    Accumulating(u32),
    Locked { until: DateTime<Utc> },
}

/// Snapshot returned to the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStatus {
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_lockout_ms: Option<u64>,
    pub attempts_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

/// Attempt counter as persisted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StoredAttempts {
    attempts: u32,
    first_attempt: i64,
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    attempts: u32,
    first_attempt_at: DateTime<Utc>,
}

/// Per-client login attempt guard.
///
/// Owns its store and clock; construct one per client (or use
/// [`GuardRegistry`] to key them by client on a server).
#[derive(Debug)]
pub struct LoginAttemptGuard<S, C = SystemClock> {
    store: S,
    clock: C,
    policy: LockoutPolicy,
}

impl<S: AttemptStore> LoginAttemptGuard<S> {
    /// Guard using wall-clock time and the default policy.
    #[must_use]
    pub fn with_defaults(store: S) -> Self {
        Self::new(store, SystemClock, LockoutPolicy::default())
    }
}

impl<S: AttemptStore, C: Clock> LoginAttemptGuard<S, C> {
    #[must_use]
    pub const fn new(store: S, clock: C, policy: LockoutPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Current state, clearing expired lockouts and stale windows first.
    pub fn state(&mut self) -> GuardState {
        let now = self.clock.now();

        if let Some(until) = self.locked_until() {
            if now < until {
                return GuardState::Locked { until };
            }
            tracing::debug!("login lockout expired, clearing attempts");
            self.clear();
            return GuardState::Clean;
        }

        match self.load_attempts() {
            Some(record) if now - record.first_attempt_at < self.policy.attempt_window => {
                GuardState::Accumulating(record.attempts)
            }
            Some(_) => {
                tracing::debug!("login attempt window expired, clearing attempts");
                self.clear();
                GuardState::Clean
            }
            None => GuardState::Clean,
        }
    }

    /// Status for the login form; call before submitting credentials.
    pub fn check_status(&mut self) -> GuardStatus {
        let max = self.policy.max_attempts;
        match self.state() {
            GuardState::Locked { until } => GuardStatus {
                is_locked: true,
                remaining_lockout_ms: Some(
                    u64::try_from((until - self.clock.now()).num_milliseconds()).unwrap_or(0),
                ),
                attempts_used: max,
                attempts_remaining: None,
            },
            GuardState::Accumulating(attempts) => GuardStatus {
                is_locked: false,
                remaining_lockout_ms: None,
                attempts_used: attempts,
                attempts_remaining: Some(max.saturating_sub(attempts)),
            },
            GuardState::Clean => GuardStatus {
                is_locked: false,
                remaining_lockout_ms: None,
                attempts_used: 0,
                attempts_remaining: Some(max),
            },
        }
    }

    /// Count a failed login. Does nothing while locked out.
    pub fn record_failure(&mut self) {
        let now = self.clock.now();
        let max = self.policy.max_attempts;

        let record = match self.state() {
            GuardState::Locked { .. } => {
                tracing::debug!("failure ignored while locked out");
                return;
            }
            GuardState::Accumulating(attempts) => AttemptRecord {
                attempts: attempts.saturating_add(1).min(max),
                first_attempt_at: self
                    .load_attempts()
                    .map_or(now, |existing| existing.first_attempt_at),
            },
            GuardState::Clean => AttemptRecord {
                attempts: 1,
                first_attempt_at: now,
            },
        };

        self.save_attempts(record);

        if record.attempts >= max {
            let until = now + self.policy.lockout_duration;
            self.write(LOCKOUT_KEY, until.timestamp_millis().to_string());
            tracing::warn!(
                attempts = record.attempts,
                locked_until = %until,
                "too many failed logins, locking out client"
            );
        }
    }

    /// Forget everything; call after a successful login.
    pub fn clear(&mut self) {
        for key in [ATTEMPTS_KEY, LOCKOUT_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(error = %e, key, "failed to clear login attempt state");
            }
        }
    }

    fn locked_until(&self) -> Option<DateTime<Utc>> {
        let raw = self.read(LOCKOUT_KEY)?;
        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
        if parsed.is_none() {
            tracing::warn!(value = %raw, "ignoring malformed lockout timestamp");
        }
        parsed
    }

    fn load_attempts(&self) -> Option<AttemptRecord> {
        let raw = self.read(ATTEMPTS_KEY)?;
        let record = serde_json::from_str::<StoredAttempts>(&raw)
            .ok()
            .filter(|stored| stored.attempts > 0)
            .and_then(|stored| {
                Some(AttemptRecord {
                    attempts: stored.attempts.min(self.policy.max_attempts),
                    first_attempt_at: DateTime::from_timestamp_millis(stored.first_attempt)?,
                })
            });
        if record.is_none() {
            tracing::warn!(value = %raw, "ignoring malformed login attempt record");
        }
        record
    }

    fn save_attempts(&mut self, record: AttemptRecord) {
        let stored = StoredAttempts {
            attempts: record.attempts,
            first_attempt: record.first_attempt_at.timestamp_millis(),
        };
        match serde_json::to_string(&stored) {
            Ok(json) => self.write(ATTEMPTS_KEY, json),
            Err(e) => tracing::warn!(error = %e, "failed to encode login attempt record"),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|e| {
            tracing::warn!(error = %e, key, "login attempt storage read failed, failing open");
            None
        })
    }

    fn write(&mut self, key: &str, value: String) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!(error = %e, key, "login attempt storage write failed");
        }
    }
}
