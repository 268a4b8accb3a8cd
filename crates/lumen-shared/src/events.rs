//! Event registry: the closed set of reward-eligible events.
//!
//! ## Default values
//!
//! | Event                  | Base XP | Category   |
//! |------------------------|---------|------------|
//! | DAILY_LOGIN            | 10      | LOGIN      |
//! | COMPLETE_LESSON        | 50      | LEARNING   |
//! | COMPLETE_COURSE        | 500     | LEARNING   |
//! | COMPLETE_QUIZ          | 30      | ASSESSMENT |
//! | PERFECT_SCORE          | 50      | ASSESSMENT |
//! | CREATE_POST            | 15      | COMMUNITY  |
//! | CREATE_COMMENT         | 5       | COMMUNITY  |
//! | RECEIVE_LIKE           | 2       | COMMUNITY  |
//! | HELP_ANSWER_ACCEPTED   | 25      | COMMUNITY  |
//!
//! Deployments override the values through configuration. A registry can only
//! be built when every kind has a value.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Reward-eligible user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    DailyLogin,
    CompleteLesson,
    CompleteCourse,
    CompleteQuiz,
    PerfectScore,
    CreatePost,
    CreateComment,
    ReceiveLike,
    HelpAnswerAccepted,
}

impl EventKind {
    pub const COUNT: usize = 9;

    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::DailyLogin,
        EventKind::CompleteLesson,
        EventKind::CompleteCourse,
        EventKind::CompleteQuiz,
        EventKind::PerfectScore,
        EventKind::CreatePost,
        EventKind::CreateComment,
        EventKind::ReceiveLike,
        EventKind::HelpAnswerAccepted,
    ];

    /// Wire name, as stored in the activity log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyLogin => "DAILY_LOGIN",
            Self::CompleteLesson => "COMPLETE_LESSON",
            Self::CompleteCourse => "COMPLETE_COURSE",
            Self::CompleteQuiz => "COMPLETE_QUIZ",
            Self::PerfectScore => "PERFECT_SCORE",
            Self::CreatePost => "CREATE_POST",
            Self::CreateComment => "CREATE_COMMENT",
            Self::ReceiveLike => "RECEIVE_LIKE",
            Self::HelpAnswerAccepted => "HELP_ANSWER_ACCEPTED",
        }
    }

    /// Parse a wire name. Matching is exact apart from surrounding whitespace.
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == trimmed)
            .ok_or_else(|| DomainError::InvalidEvent(name.to_string()))
    }

    /// Audit-log category. Adding a kind without a category fails to compile.
    pub fn category(&self) -> ActivityCategory {
        match self {
            Self::DailyLogin => ActivityCategory::Login,
            Self::CompleteLesson | Self::CompleteCourse => ActivityCategory::Learning,
            Self::CompleteQuiz | Self::PerfectScore => ActivityCategory::Assessment,
            Self::CreatePost
            | Self::CreateComment
            | Self::ReceiveLike
            | Self::HelpAnswerAccepted => ActivityCategory::Community,
        }
    }

    /// Human description written into the activity log
    pub fn description(&self) -> &'static str {
        match self {
            Self::DailyLogin => "Logged in",
            Self::CompleteLesson => "Completed a lesson",
            Self::CompleteCourse => "Completed a course",
            Self::CompleteQuiz => "Completed a quiz",
            Self::PerfectScore => "Scored 100% on a quiz",
            Self::CreatePost => "Created a forum post",
            Self::CreateComment => "Commented on a post",
            Self::ReceiveLike => "Received a like",
            Self::HelpAnswerAccepted => "Answer accepted as helpful",
        }
    }

    /// Shipped base XP, used when configuration does not override it
    pub fn default_base_xp(&self) -> u64 {
        match self {
            Self::DailyLogin => 10,
            Self::CompleteLesson => 50,
            Self::CompleteCourse => 500,
            Self::CompleteQuiz => 30,
            Self::PerfectScore => 50,
            Self::CreatePost => 15,
            Self::CreateComment => 5,
            Self::ReceiveLike => 2,
            Self::HelpAnswerAccepted => 25,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Activity-log taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityCategory {
    Login,
    Learning,
    Assessment,
    Community,
}

impl ActivityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Learning => "LEARNING",
            Self::Assessment => "ASSESSMENT",
            Self::Community => "COMMUNITY",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base-XP table for every event kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistry {
    base_xp: [u64; EventKind::COUNT],
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EventRegistry {
    /// Registry carrying the shipped defaults
    pub fn with_defaults() -> Self {
        let mut base_xp = [0; EventKind::COUNT];
        for kind in EventKind::ALL {
            base_xp[kind.index()] = kind.default_base_xp();
        }
        Self { base_xp }
    }

    /// Build from a configuration table keyed by wire name.
    ///
    /// Unknown names and missing kinds are both rejected.
    pub fn from_table(table: &BTreeMap<String, u64>) -> Result<Self, DomainError> {
        let mut base_xp: [Option<u64>; EventKind::COUNT] = [None; EventKind::COUNT];
        for (name, xp) in table {
            let kind = EventKind::parse(name).map_err(|_| {
                DomainError::InvalidConfig(format!("unknown event '{}' in base_xp table", name))
            })?;
            base_xp[kind.index()] = Some(*xp);
        }

        let mut resolved = [0; EventKind::COUNT];
        for kind in EventKind::ALL {
            resolved[kind.index()] =
                base_xp[kind.index()].ok_or(DomainError::MissingBaseXp(kind.as_str()))?;
        }
        Ok(Self { base_xp: resolved })
    }

    /// Default table keyed by wire name, as written to configuration
    pub fn default_table() -> BTreeMap<String, u64> {
        EventKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), kind.default_base_xp()))
            .collect()
    }

    pub fn is_valid_event(&self, name: &str) -> bool {
        EventKind::parse(name).is_ok()
    }

    pub fn base_xp(&self, kind: EventKind) -> u64 {
        self.base_xp[kind.index()]
    }

    /// Validate a name and look up its base XP in one step
    pub fn resolve(&self, name: &str) -> Result<(EventKind, u64), DomainError> {
        let kind = EventKind::parse(name)?;
        Ok((kind, self.base_xp(kind)))
    }
}
