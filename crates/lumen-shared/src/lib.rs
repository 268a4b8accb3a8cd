//! Shared domain types for the Lumen reward engine.
//!
//! Everything in this crate is pure computation: no I/O, no clocks, no locks.
//! The runtime pieces (storage, guard, coordinator) live in `lumen_common`.

pub mod error;
pub mod events;
pub mod levels;
pub mod metadata;
pub mod profile;
pub mod reward;
pub mod streaks;

pub use error::DomainError;
pub use events::{ActivityCategory, EventKind, EventRegistry};
pub use levels::{title_for, LevelCurve, LevelProgress, DEFAULT_LEVEL_STEP, TITLE_BANDS};
pub use metadata::{validate_metadata, Metadata, MetadataLimits};
pub use profile::{ActivityLogEntry, StreakHistoryEntry, UserGameProfile, UserId};
pub use reward::{compose, RewardResult, StreakSnapshot};
pub use streaks::{
    calculate_streak, MilestoneRule, StreakOutcome, StreakPolicy, StreakState, TimezonePolicy,
};
