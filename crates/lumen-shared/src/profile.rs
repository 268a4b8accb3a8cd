//! Persisted records: the per-user aggregate and its two audit tables.

use crate::events::{ActivityCategory, EventKind};
use crate::metadata::Metadata;
use crate::streaks::StreakState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user gamification aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGameProfile {
    pub user_id: UserId,
    /// Cumulative XP, never decreases
    pub total_xp: u64,
    /// Always `LevelCurve::level_of(total_xp)`
    pub current_level: u32,
    pub current_streak: u32,
    /// High-water mark, `>= current_streak`
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

impl UserGameProfile {
    /// Fresh profile for a user who has never earned anything
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_xp: 0,
            current_level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_active_date: None,
        }
    }

    pub fn streak_state(&self) -> StreakState {
        StreakState {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_active_date: self.last_active_date,
        }
    }
}

/// One row of streak history; at most one per user is current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakHistoryEntry {
    pub streak_date: NaiveDate,
    pub streak_length: u32,
    pub is_current: bool,
}

/// Immutable audit record for one processed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub user_id: UserId,
    pub event_type: EventKind,
    pub category: ActivityCategory,
    pub description: String,
    pub xp_earned: u64,
    pub previous_streak: u32,
    pub new_streak: u32,
    pub previous_level: u32,
    pub new_level: u32,
    pub streak_updated: bool,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}
