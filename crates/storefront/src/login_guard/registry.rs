//! Server-side guard registry keyed by client.
//!
//! Each client key (normally the client IP) gets its own
//! [`LoginAttemptGuard`] over a private [`MemoryStore`]. Guards sit behind a
//! per-key mutex so concurrent failures from one client are counted one at a
//! time. Idle guards are evicted by `moka` once both the attempt window and
//! the lockout would have expired anyway.

use std::sync::{Arc, Mutex, PoisonError};

use aodai_core::Clock;
use moka::sync::Cache;

use super::{GuardStatus, LockoutPolicy, LoginAttemptGuard, MemoryStore};

type SharedGuard = Arc<Mutex<LoginAttemptGuard<MemoryStore, Arc<dyn Clock>>>>;

const MAX_TRACKED_CLIENTS: u64 = 100_000;

/// Login attempt guards for many clients.
#[derive(Clone)]
pub struct GuardRegistry {
    guards: Cache<String, SharedGuard>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl GuardRegistry {
    #[must_use]
    pub fn new(policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        let idle = policy
            .attempt_window
            .max(policy.lockout_duration)
            .to_std()
            .unwrap_or_default();

        let guards = Cache::builder()
            .max_capacity(MAX_TRACKED_CLIENTS)
            .time_to_idle(idle)
            .build();

        Self {
            guards,
            clock,
            policy,
        }
    }

    /// Status for one client.
    pub fn check_status(&self, client: &str) -> GuardStatus {
        self.with_guard(client, LoginAttemptGuard::check_status)
    }

    /// Record a failed login for one client and return the resulting status.
    pub fn record_failure(&self, client: &str) -> GuardStatus {
        self.with_guard(client, |guard| {
            guard.record_failure();
            guard.check_status()
        })
    }

    /// Clear a client's history after a successful login.
    pub fn clear(&self, client: &str) {
        if let Some(guard) = self.guards.get(client) {
            guard.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.guards.invalidate(client);
    }

    fn with_guard<T>(
        &self,
        client: &str,
        f: impl FnOnce(&mut LoginAttemptGuard<MemoryStore, Arc<dyn Clock>>) -> T,
    ) -> T {
        let guard = self.guards.get_with_by_ref(client, || {
            Arc::new(Mutex::new(LoginAttemptGuard::new(
                MemoryStore::new(),
                Arc::clone(&self.clock),
                self.policy,
            )))
        });
        let mut guard = guard.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }
}

impl std::fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardRegistry")
            .field("tracked_clients", &self.guards.entry_count())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
