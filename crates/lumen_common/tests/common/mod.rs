//! Shared fixtures for the reward engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lumen_common::store::{CommitGate, RewardCommit, RewardStore};
use lumen_common::{
    Clock, ConcurrencyGuard, InMemoryGuard, ManualClock, RewardCoordinator, RewardRules,
    SqliteRewardStore, StoreError,
};
use lumen_shared::{
    ActivityLogEntry, Metadata, StreakHistoryEntry, UserGameProfile, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);

/// 2024-03-01 09:00 UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Store wrapper that can slow down or fail the commit step
pub struct FlakyStore {
    pub inner: Arc<SqliteRewardStore>,
    commit_delay: Option<std::time::Duration>,
    /// 1-based commit attempt that fails, if any
    fail_on_commit: Option<usize>,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteRewardStore>) -> Self {
        Self {
            inner,
            commit_delay: None,
            fail_on_commit: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, attempt: usize) -> Self {
        self.fail_on_commit = Some(attempt);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewardStore for FlakyStore {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserGameProfile>, StoreError> {
        self.inner.load_profile(user_id).await
    }

    async fn latest_current_entry(
        &self,
        user_id: UserId,
    ) -> Result<Option<StreakHistoryEntry>, StoreError> {
        self.inner.latest_current_entry(user_id).await
    }

    async fn recent_streak_entries(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StreakHistoryEntry>, StoreError> {
        self.inner.recent_streak_entries(user_id, limit).await
    }

    async fn recent_activity(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        self.inner.recent_activity(user_id, limit).await
    }

    async fn commit(&self, commit: RewardCommit, gate: CommitGate) -> Result<(), StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_commit == Some(attempt) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        self.inner.commit(commit, gate).await
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub guard: Arc<dyn ConcurrencyGuard>,
    pub db: Arc<SqliteRewardStore>,
    pub coordinator: Arc<RewardCoordinator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_rules(RewardRules::default()).await
    }

    pub async fn with_rules(rules: RewardRules) -> Self {
        let db = Arc::new(SqliteRewardStore::open_in_memory().await.unwrap());
        Self::build(db.clone(), db, rules)
    }

    /// Harness whose coordinator talks to the database through `store`
    pub fn build(
        db: Arc<SqliteRewardStore>,
        store: Arc<dyn RewardStore>,
        rules: RewardRules,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let guard: Arc<dyn ConcurrencyGuard> = Arc::new(InMemoryGuard::new(
            std::time::Duration::from_secs(30),
            dyn_clock.clone(),
        ));
        let coordinator = Arc::new(RewardCoordinator::new(
            store,
            guard.clone(),
            dyn_clock,
            rules,
        ));
        Self {
            clock,
            guard,
            db,
            coordinator,
        }
    }

    pub async fn add_user(&self, user: UserId) {
        self.db.create_profile(user).await.unwrap();
    }

    pub async fn profile(&self, user: UserId) -> UserGameProfile {
        self.db.load_profile(user).await.unwrap().unwrap()
    }

    pub async fn current_entries(&self, user: UserId) -> usize {
        self.db
            .streak_history(user)
            .await
            .unwrap()
            .iter()
            .filter(|entry| entry.is_current)
            .count()
    }

    pub fn next_day(&self) {
        self.clock.advance(Duration::days(1));
    }

    /// Log in once per day for `days` consecutive days, starting today
    pub async fn login_days(&self, user: UserId, days: u32) {
        for day in 0..days {
            if day > 0 {
                self.next_day();
            }
            self.coordinator
                .process_event(user, "DAILY_LOGIN", Metadata::new())
                .await
                .unwrap();
        }
    }
}
