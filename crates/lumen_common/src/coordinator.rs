//! Reward transaction coordinator.
//!
//! One event runs `acquire lock -> validate -> load profile -> compute ->
//! persist -> release`. The lock is held by a `Lease`, so it is released on
//! every exit path including early returns and a dropped future. Once the
//! commit starts, the lease moves into the commit task: a caller that stops
//! waiting leaves the lock held until the write has finished.

use crate::clock::{Clock, SystemClock};
use crate::config::{RewardRules, RewardsConfig};
use crate::error::{ErrorKind, RewardError, StoreError};
use crate::guard::{ConcurrencyGuard, InMemoryGuard, Lease};
use crate::store::{CancelSignal, CommitGate, RewardCommit, RewardStore};
use lumen_shared::{
    calculate_streak, compose, validate_metadata, ActivityLogEntry, DomainError, LevelProgress,
    Metadata, RewardResult, StreakHistoryEntry, UserGameProfile, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Streak-history rows handed to the streak calculator
const RECENT_HISTORY_LIMIT: usize = 7;

/// Read-side view of a user's progression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub profile: UserGameProfile,
    pub progress: LevelProgress,
    pub current_entry: Option<StreakHistoryEntry>,
}

pub struct RewardCoordinator {
    store: Arc<dyn RewardStore>,
    guard: Arc<dyn ConcurrencyGuard>,
    clock: Arc<dyn Clock>,
    rules: RewardRules,
    persist_timeout: Duration,
}

impl RewardCoordinator {
    pub fn new(
        store: Arc<dyn RewardStore>,
        guard: Arc<dyn ConcurrencyGuard>,
        clock: Arc<dyn Clock>,
        rules: RewardRules,
    ) -> Self {
        Self {
            store,
            guard,
            clock,
            rules,
            persist_timeout: Duration::from_millis(crate::config::DEFAULT_PERSIST_TIMEOUT_MS),
        }
    }

    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    /// Build a coordinator on the real clock with an in-process guard
    pub fn from_config(
        config: &RewardsConfig,
        store: Arc<dyn RewardStore>,
    ) -> Result<Self, DomainError> {
        let rules = config.rules()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let guard: Arc<dyn ConcurrencyGuard> =
            Arc::new(InMemoryGuard::new(config.lock_timeout(), Arc::clone(&clock)));
        Ok(Self::new(store, guard, clock, rules).with_persist_timeout(config.persist_timeout()))
    }

    pub fn guard(&self) -> &Arc<dyn ConcurrencyGuard> {
        &self.guard
    }

    pub fn rules(&self) -> &RewardRules {
        &self.rules
    }

    /// Release every held lock. Returns how many were dropped.
    pub fn shutdown(&self) -> usize {
        let drained = self.guard.drain();
        if drained > 0 {
            warn!(drained, "Dropped reward locks still held at shutdown");
        }
        drained
    }

    pub async fn process_event(
        &self,
        user_id: UserId,
        event_name: &str,
        metadata: Metadata,
    ) -> Result<RewardResult, RewardError> {
        self.process_event_with_cancel(user_id, event_name, metadata, CancelSignal::never())
            .await
    }

    /// Process one event. If `cancel` fires or the persist timeout passes
    /// before the commit, nothing is written.
    pub async fn process_event_with_cancel(
        &self,
        user_id: UserId,
        event_name: &str,
        metadata: Metadata,
        cancel: CancelSignal,
    ) -> Result<RewardResult, RewardError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "process_event",
            %request_id,
            user_id = %user_id,
            event = event_name.trim()
        );

        async move {
            let result = self.run(user_id, event_name, metadata, cancel).await;
            match &result {
                Ok(reward) => info!(
                    xp = reward.total_xp,
                    total_xp = reward.new_total_xp,
                    level = reward.new_level,
                    streak = reward.streak.current_streak,
                    milestone = reward.streak_milestone_reached,
                    "Reward committed"
                ),
                Err(err) => log_failure(err),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        user_id: UserId,
        event_name: &str,
        metadata: Metadata,
        cancel: CancelSignal,
    ) -> Result<RewardResult, RewardError> {
        let lease =
            Lease::acquire(&self.guard, user_id).ok_or(RewardError::InProgress(user_id))?;

        let (event, base_xp) = self.rules.registry.resolve(event_name)?;
        validate_metadata(&metadata, &self.rules.metadata_limits)?;

        let profile = self
            .store
            .load_profile(user_id)
            .await?
            .ok_or(RewardError::UserNotFound(user_id))?;
        let recent = self
            .store
            .recent_streak_entries(user_id, RECENT_HISTORY_LIMIT)
            .await?;

        if cancel.is_cancelled() {
            return Err(RewardError::Cancelled);
        }

        let now = self.clock.now();
        let streak = calculate_streak(
            &profile.streak_state(),
            &recent,
            now,
            &self.rules.streak_policy,
        );
        let reward = compose(event, base_xp, &profile, &streak, &self.rules.curve);
        debug!(
            base_xp,
            bonus = reward.streak_bonus,
            streak_updated = streak.streak_updated,
            "Reward computed"
        );

        let commit = RewardCommit::from_reward(&profile, &reward, metadata, now);
        let gate = CommitGate::new(Instant::now() + self.persist_timeout, cancel);
        let store = Arc::clone(&self.store);
        tokio::spawn(
            async move {
                let _lease = lease;
                store.commit(commit, gate).await
            }
            .instrument(Span::current()),
        )
        .await
        .map_err(StoreError::from)??;

        Ok(reward)
    }

    pub async fn profile_summary(&self, user_id: UserId) -> Result<ProfileSummary, RewardError> {
        let profile = self
            .store
            .load_profile(user_id)
            .await?
            .ok_or(RewardError::UserNotFound(user_id))?;
        let current_entry = self.store.latest_current_entry(user_id).await?;
        let progress = self.rules.curve.progress(profile.total_xp);

        Ok(ProfileSummary {
            profile,
            progress,
            current_entry,
        })
    }

    /// Newest-first activity log for an existing user
    pub async fn recent_activity(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, RewardError> {
        if self.store.load_profile(user_id).await?.is_none() {
            return Err(RewardError::UserNotFound(user_id));
        }
        Ok(self.store.recent_activity(user_id, limit).await?)
    }
}

fn log_failure(err: &RewardError) {
    match err.kind() {
        ErrorKind::Server if matches!(err, RewardError::Cancelled) => {
            warn!(code = err.code(), "Reward cancelled before commit, rolled back")
        }
        ErrorKind::Server => error!(
            code = err.code(),
            error = %source_chain(err),
            "Reward failed, transaction rolled back"
        ),
        ErrorKind::Contention => warn!(code = err.code(), "Reward rejected: {}", err),
        ErrorKind::Client | ErrorKind::NotFound => {
            debug!(code = err.code(), "Reward rejected: {}", err)
        }
    }
}

/// `err: cause: cause` down to the root
fn source_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // thiserror variants often already print their source
        if !chain.ends_with(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_source_chain_includes_causes() {
        let err = RewardError::Persistence(StoreError::Unavailable("disk full".into()));
        let chain = source_chain(&err);
        assert!(chain.starts_with("reward persistence failed"));
        assert!(chain.ends_with("storage unavailable: disk full"));
        assert_eq!(chain.matches("disk full").count(), 1);
    }
}
