//! Streak calculation.
//!
//! A streak counts consecutive calendar days with at least one reward-eligible
//! event. Days are evaluated in the deployment's reference timezone, not raw
//! UTC, so a learner just before local midnight lands on the right day. A named
//! IANA zone follows daylight-saving changes; a fixed offset does not.

use crate::error::DomainError;
use crate::profile::StreakHistoryEntry;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MILESTONE_EVERY: u32 = 7;
pub const DEFAULT_BONUS_PER_DAY: u64 = 10;

/// Reference timezone for day boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimezonePolicy {
    #[default]
    Utc,
    Fixed(FixedOffset),
    /// IANA zone such as `America/New_York`
    Named(Tz),
}

impl TimezonePolicy {
    /// Fixed offset east of UTC, in minutes (negative for west)
    pub fn fixed_minutes(minutes: i32) -> Result<Self, DomainError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::Fixed)
            .ok_or_else(|| {
                DomainError::InvalidConfig(format!("UTC offset of {} minutes is out of range", minutes))
            })
    }

    pub fn named(name: &str) -> Result<Self, DomainError> {
        name.trim()
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| DomainError::InvalidConfig(format!("unknown timezone '{}'", name)))
    }

    /// Calendar date of `now` in this timezone
    pub fn calendar_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => now.date_naive(),
            Self::Fixed(offset) => now.with_timezone(offset).date_naive(),
            Self::Named(tz) => now.with_timezone(tz).date_naive(),
        }
    }
}

/// Which streak lengths earn a milestone bonus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneRule {
    /// Every multiple of the interval
    Every(u32),
    /// An explicit list of day counts
    Days(Vec<u32>),
}

impl Default for MilestoneRule {
    fn default() -> Self {
        Self::Every(DEFAULT_MILESTONE_EVERY)
    }
}

impl MilestoneRule {
    pub fn is_milestone(&self, streak: u32) -> bool {
        if streak == 0 {
            return false;
        }
        match self {
            Self::Every(interval) => *interval > 0 && streak % interval == 0,
            Self::Days(days) => days.contains(&streak),
        }
    }
}

/// Streak rules for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakPolicy {
    pub timezone: TimezonePolicy,
    pub milestones: MilestoneRule,
    /// Milestone bonus is `new_streak * bonus_per_day`
    pub bonus_per_day: u64,
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            timezone: TimezonePolicy::Utc,
            milestones: MilestoneRule::default(),
            bonus_per_day: DEFAULT_BONUS_PER_DAY,
        }
    }
}

/// Prior streak state, taken from the user profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

/// Result of evaluating one event against the prior state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakOutcome {
    pub today: NaiveDate,
    pub previous_streak: u32,
    pub new_streak: u32,
    pub new_longest: u32,
    /// True when this event started a new streak day
    pub streak_updated: bool,
    pub milestone_reached: bool,
    pub milestone_bonus: u64,
    pub last_active_date: NaiveDate,
}

/// Evaluate the streak for an event happening at `now`.
///
/// `recent` is the newest-first streak history. It is only consulted when the
/// profile has no last-active date, to recover from a profile row that lost
/// it while the history still has a current entry.
pub fn calculate_streak(
    state: &StreakState,
    recent: &[StreakHistoryEntry],
    now: DateTime<Utc>,
    policy: &StreakPolicy,
) -> StreakOutcome {
    let today = policy.timezone.calendar_date(now);
    let state = recover_state(state, recent);
    let previous_streak = state.current_streak;

    let (new_streak, streak_updated) = match state.last_active_date {
        None => (1, true),
        Some(last) => match (today - last).num_days() {
            1 => (previous_streak.saturating_add(1), true),
            // Same day, or a last date ahead of today after an offset change:
            // never a new streak day.
            days if days <= 0 => (previous_streak, false),
            _ => (1, true),
        },
    };

    let new_longest = state.longest_streak.max(new_streak);
    let milestone_reached = streak_updated
        && new_streak > previous_streak
        && policy.milestones.is_milestone(new_streak);
    let milestone_bonus = if milestone_reached {
        u64::from(new_streak).saturating_mul(policy.bonus_per_day)
    } else {
        0
    };

    let last_active_date = match state.last_active_date {
        Some(last) if !streak_updated => last,
        _ => today,
    };

    StreakOutcome {
        today,
        previous_streak,
        new_streak,
        new_longest,
        streak_updated,
        milestone_reached,
        milestone_bonus,
        last_active_date,
    }
}

fn recover_state(state: &StreakState, recent: &[StreakHistoryEntry]) -> StreakState {
    if state.last_active_date.is_some() {
        return *state;
    }
    match recent.iter().find(|entry| entry.is_current) {
        Some(current) => StreakState {
            current_streak: current.streak_length,
            longest_streak: state.longest_streak.max(current.streak_length),
            last_active_date: Some(current.streak_date),
        },
        None => *state,
    }
}
