//! Level progression.
//!
//! ## XP Curve
//!
//! Triangular curve, level 1 starts at 0 XP:
//!
//! `xp_threshold(L) = step * (L - 1) * L / 2`
//!
//! With the default `step = 100`:
//! - Level 2: 100 XP
//! - Level 3: 300 XP
//! - Level 4: 600 XP
//! - Level 10: 4,500 XP
//! - Level 50: 122,500 XP
//!
//! The step is deployment configuration. Changing it after launch means every
//! stored level has to be re-derived from total XP.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEVEL_STEP: u64 = 100;

/// Title bands mapping level ranges to display titles
pub const TITLE_BANDS: &[(u32, u32, &str)] = &[
    (1, 4, "Novice"),
    (5, 9, "Apprentice"),
    (10, 19, "Scholar"),
    (20, 34, "Adept"),
    (35, 49, "Expert"),
    (50, 74, "Master"),
    (75, u32::MAX, "Sage"),
];

/// Get the display title for a level
pub fn title_for(level: u32) -> &'static str {
    TITLE_BANDS
        .iter()
        .find(|(min, max, _)| level >= *min && level <= *max)
        .map(|(_, _, title)| *title)
        .unwrap_or("Novice")
}

/// Progress view for rendering a level bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub current_level: u32,
    pub title: String,
    /// Total XP accumulated
    pub current_xp: u64,
    /// XP at which the current level starts
    pub xp_for_current_level: u64,
    /// XP at which the next level starts
    pub xp_for_next_level: u64,
    /// Fraction of the current level completed (0.0 - 1.0)
    pub xp_progress: f64,
    pub xp_remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCurve {
    step: u64,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            step: DEFAULT_LEVEL_STEP,
        }
    }
}

impl LevelCurve {
    pub fn new(step: u64) -> Result<Self, DomainError> {
        if step == 0 {
            return Err(DomainError::InvalidConfig(
                "level step must be greater than zero".to_string(),
            ));
        }
        Ok(Self { step })
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Minimum total XP needed to be at `level`
    pub fn xp_threshold(&self, level: u32) -> u64 {
        if level <= 1 {
            return 0;
        }
        let n = u128::from(level - 1);
        let total = u128::from(self.step) * (n * (n + 1) / 2);
        u64::try_from(total).unwrap_or(u64::MAX)
    }

    /// Level reached with `total_xp`
    pub fn level_of(&self, total_xp: u64) -> u32 {
        // step * T(n) <= xp  <=>  T(n) <= floor(xp / step), T(n) = n(n+1)/2
        let budget = u128::from(total_xp / self.step);
        let triangle = |n: u128| n * (n + 1) / 2;

        let estimate = ((8.0 * budget as f64 + 1.0).sqrt() - 1.0) / 2.0;
        let mut n = estimate.max(0.0) as u128;
        while triangle(n + 1) <= budget {
            n += 1;
        }
        while n > 0 && triangle(n) > budget {
            n -= 1;
        }

        u32::try_from(n + 1).unwrap_or(u32::MAX)
    }

    /// Full progress view for `total_xp`
    pub fn progress(&self, total_xp: u64) -> LevelProgress {
        let current_level = self.level_of(total_xp);
        let xp_for_current_level = self.xp_threshold(current_level);
        let xp_for_next_level = self.xp_threshold(current_level.saturating_add(1));
        let span = xp_for_next_level.saturating_sub(xp_for_current_level);

        let xp_progress = if span == 0 {
            1.0
        } else {
            let into_level = total_xp.saturating_sub(xp_for_current_level);
            (into_level as f64 / span as f64).clamp(0.0, 1.0)
        };

        LevelProgress {
            current_level,
            title: title_for(current_level).to_string(),
            current_xp: total_xp,
            xp_for_current_level,
            xp_for_next_level,
            xp_progress,
            xp_remaining: xp_for_next_level.saturating_sub(total_xp),
        }
    }
}
