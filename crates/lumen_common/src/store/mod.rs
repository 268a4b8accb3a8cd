//! Storage contracts for the reward coordinator.
//!
//! The coordinator reads through `RewardStore` and writes exactly once per
//! event through `commit`, which must apply the profile update, the streak
//! history rotation and the activity-log append in one transaction.

pub mod sqlite;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumen_shared::{
    ActivityLogEntry, Metadata, RewardResult, StreakHistoryEntry, UserGameProfile, UserId,
};
use std::time::Instant;
use tokio::sync::watch;

pub use sqlite::SqliteRewardStore;

/// Everything one reward writes, applied atomically
#[derive(Debug, Clone, PartialEq)]
pub struct RewardCommit {
    pub profile: UserGameProfile,
    /// New current streak-history row, present only when a new streak day began
    pub new_streak_entry: Option<StreakHistoryEntry>,
    pub activity: ActivityLogEntry,
}

impl RewardCommit {
    /// Derive the writes for `reward` computed against `profile`
    pub fn from_reward(
        profile: &UserGameProfile,
        reward: &RewardResult,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        let new_streak_entry = reward.streak.streak_updated.then(|| StreakHistoryEntry {
            streak_date: reward.streak.last_active_date,
            streak_length: reward.streak.current_streak,
            is_current: true,
        });

        let mut description = format!("{} (+{} XP)", reward.event.description(), reward.total_xp);
        if reward.streak_milestone_reached {
            description.push_str(&format!(
                ", {}-day streak bonus",
                reward.streak.current_streak
            ));
        }

        Self {
            profile: reward.updated_profile(profile),
            new_streak_entry,
            activity: ActivityLogEntry {
                user_id: profile.user_id,
                event_type: reward.event,
                category: reward.event.category(),
                description,
                xp_earned: reward.total_xp,
                previous_streak: reward.streak.previous_streak,
                new_streak: reward.streak.current_streak,
                previous_level: reward.previous_level,
                new_level: reward.new_level,
                streak_updated: reward.streak.streak_updated,
                metadata,
                created_at,
            },
        }
    }
}

/// Caller-side cancellation, e.g. a client disconnect
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Fires a `CancelSignal`
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// Linked trigger/signal pair
    pub fn pair() -> (CancelTrigger, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Last check before a transaction commits: rolled back if cancelled or late
#[derive(Debug, Clone)]
pub struct CommitGate {
    deadline: Instant,
    cancel: CancelSignal,
}

impl CommitGate {
    pub fn new(deadline: Instant, cancel: CancelSignal) -> Self {
        Self { deadline, cancel }
    }

    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// User repository, streak-history store and activity log behind one seam
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserGameProfile>, StoreError>;

    async fn latest_current_entry(
        &self,
        user_id: UserId,
    ) -> Result<Option<StreakHistoryEntry>, StoreError>;

    /// Newest-first streak history
    async fn recent_streak_entries(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StreakHistoryEntry>, StoreError>;

    /// Newest-first activity log
    async fn recent_activity(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError>;

    /// Apply all writes of one reward atomically, checking `gate` right before
    /// committing. On any error nothing is written.
    async fn commit(&self, commit: RewardCommit, gate: CommitGate) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gate_passes_before_deadline() {
        let gate = CommitGate::new(Instant::now() + Duration::from_secs(60), CancelSignal::never());
        assert!(gate.check().is_ok());
    }

    #[test]
    fn test_gate_rejects_after_deadline() {
        let gate = CommitGate::new(Instant::now(), CancelSignal::never());
        assert!(matches!(gate.check(), Err(StoreError::DeadlineExceeded)));
    }

    #[test]
    fn test_gate_rejects_when_cancelled() {
        let (trigger, signal) = CancelSignal::pair();
        let gate = CommitGate::new(Instant::now() + Duration::from_secs(60), signal.clone());
        assert!(gate.check().is_ok());
        trigger.cancel();
        assert!(signal.is_cancelled());
        assert!(matches!(gate.check(), Err(StoreError::Cancelled)));
    }
}
