//! Reward composition: base XP + streak milestone bonus + level change.
//!
//! Pure and deterministic. Ordinary streak continuation adds no XP on its
//! own; only a milestone bonus does.

use crate::events::EventKind;
use crate::levels::{LevelCurve, LevelProgress};
use crate::profile::UserGameProfile;
use crate::streaks::StreakOutcome;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Streak state after the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    pub previous_streak: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_updated: bool,
    pub last_active_date: NaiveDate,
}

/// Computed, not yet persisted, outcome of one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardResult {
    pub event: EventKind,
    pub base_xp: u64,
    pub streak_bonus: u64,
    /// XP earned by this event: `base_xp + streak_bonus`
    pub total_xp: u64,
    pub previous_total_xp: u64,
    pub new_total_xp: u64,
    pub previous_level: u32,
    pub new_level: u32,
    pub levels_gained: u32,
    pub streak: StreakSnapshot,
    pub streak_milestone_reached: bool,
    pub level_progress: LevelProgress,
}

impl RewardResult {
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }

    /// The profile as it must look once this reward is committed
    pub fn updated_profile(&self, profile: &UserGameProfile) -> UserGameProfile {
        UserGameProfile {
            user_id: profile.user_id,
            total_xp: self.new_total_xp,
            current_level: self.new_level,
            current_streak: self.streak.current_streak,
            longest_streak: self.streak.longest_streak,
            last_active_date: Some(self.streak.last_active_date),
        }
    }
}

/// Combine the event's base XP with the streak outcome for `profile`.
///
/// Levels are derived from total XP on both sides, never read from the
/// stored `current_level`.
pub fn compose(
    event: EventKind,
    base_xp: u64,
    profile: &UserGameProfile,
    streak: &StreakOutcome,
    curve: &LevelCurve,
) -> RewardResult {
    let streak_bonus = streak.milestone_bonus;
    let total_xp = base_xp.saturating_add(streak_bonus);
    let previous_total_xp = profile.total_xp;
    let new_total_xp = previous_total_xp.saturating_add(total_xp);

    let previous_level = curve.level_of(previous_total_xp);
    let new_level = curve.level_of(new_total_xp);

    RewardResult {
        event,
        base_xp,
        streak_bonus,
        total_xp,
        previous_total_xp,
        new_total_xp,
        previous_level,
        new_level,
        levels_gained: new_level - previous_level,
        streak: StreakSnapshot {
            previous_streak: streak.previous_streak,
            current_streak: streak.new_streak,
            longest_streak: streak.new_longest,
            streak_updated: streak.streak_updated,
            last_active_date: streak.last_active_date,
        },
        streak_milestone_reached: streak.milestone_reached,
        level_progress: curve.progress(new_total_xp),
    }
}
