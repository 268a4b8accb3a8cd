//! Per-user concurrency guard.
//!
//! Only one reward computation per user may run at a time. A lock older than
//! the timeout is stale and may be taken over, which bounds the lockout left
//! behind by a crashed or hung request. Release is token-checked so a request
//! whose lock went stale cannot free the lock of the request that took over.
//!
//! `InMemoryGuard` is correct for a single process only. A multi-instance
//! deployment needs a shared lease behind the same trait.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use lumen_shared::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Longest accepted lock timeout, one day
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Proof of ownership handed out by `try_acquire`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(u64);

pub trait ConcurrencyGuard: Send + Sync {
    /// Take the lock for `user`, or `None` while another request holds it
    fn try_acquire(&self, user: UserId) -> Option<LockToken>;

    /// Release the lock if `token` still owns it. Returns whether it did.
    fn release(&self, user: UserId, token: LockToken) -> bool;

    /// Users currently holding a live lock
    fn held(&self) -> Vec<UserId>;

    /// Drop every lock, returning how many were held. Used at shutdown.
    fn drain(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct HeldLock {
    token: LockToken,
    acquired_at: DateTime<Utc>,
}

/// In-process lock map with timestamped entries
pub struct InMemoryGuard {
    locks: Mutex<HashMap<UserId, HeldLock>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    next_token: AtomicU64,
}

impl InMemoryGuard {
    /// `timeout` is capped at `MAX_LOCK_TIMEOUT_SECS`
    pub fn new(timeout: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        let capped = timeout.min(std::time::Duration::from_secs(MAX_LOCK_TIMEOUT_SECS));
        let timeout = Duration::milliseconds(capped.as_millis() as i64);
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
            clock,
            next_token: AtomicU64::new(1),
        }
    }

    fn is_stale(&self, held: &HeldLock, now: DateTime<Utc>) -> bool {
        now - held.acquired_at >= self.timeout
    }
}

impl ConcurrencyGuard for InMemoryGuard {
    fn try_acquire(&self, user: UserId) -> Option<LockToken> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(held) = locks.get(&user) {
            if !self.is_stale(held, now) {
                return None;
            }
            warn!(
                user_id = %user,
                held_since = %held.acquired_at,
                "Taking over stale reward lock"
            );
        }

        // Stale locks of users who never came back
        let before = locks.len();
        locks.retain(|_, held| !self.is_stale(held, now));
        if locks.len() < before {
            debug!(pruned = before - locks.len(), "Pruned stale reward locks");
        }

        let token = LockToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        locks.insert(
            user,
            HeldLock {
                token,
                acquired_at: now,
            },
        );
        Some(token)
    }

    fn release(&self, user: UserId, token: LockToken) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        match locks.get(&user) {
            Some(held) if held.token == token => {
                locks.remove(&user);
                true
            }
            Some(_) => {
                debug!(user_id = %user, "Lock already taken over, skipping release");
                false
            }
            None => false,
        }
    }

    fn held(&self) -> Vec<UserId> {
        let now = self.clock.now();
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let mut users: Vec<UserId> = locks
            .iter()
            .filter(|(_, held)| !self.is_stale(held, now))
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        users
    }

    fn drain(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let count = locks.len();
        locks.clear();
        count
    }
}

/// Held lock that releases itself when dropped, on every exit path
pub struct Lease {
    guard: Arc<dyn ConcurrencyGuard>,
    user: UserId,
    token: LockToken,
}

impl Lease {
    pub fn acquire(guard: &Arc<dyn ConcurrencyGuard>, user: UserId) -> Option<Self> {
        let token = guard.try_acquire(user)?;
        Some(Self {
            guard: Arc::clone(guard),
            user,
            token,
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.guard.release(self.user, self.token);
    }
}
