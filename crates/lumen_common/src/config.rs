//! Reward engine configuration.
//!
//! Config file: `$LUMEN_CONFIG`, ~/.config/lumen/rewards.toml or
//! /etc/lumen/rewards.toml. Base XP values and the level step are versioned
//! configuration: changing the step after launch requires running
//! `lumenctl rederive` once.

use anyhow::{Context, Result};
use lumen_shared::streaks::{DEFAULT_BONUS_PER_DAY, DEFAULT_MILESTONE_EVERY};
use lumen_shared::{
    DomainError, EventRegistry, LevelCurve, MetadataLimits, MilestoneRule, StreakPolicy,
    TimezonePolicy, DEFAULT_LEVEL_STEP,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::guard::{DEFAULT_LOCK_TIMEOUT_SECS, MAX_LOCK_TIMEOUT_SECS};

pub const CONFIG_ENV_VAR: &str = "LUMEN_CONFIG";

pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 5_000;

/// Level curve settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelsConfig {
    /// XP per triangular step
    #[serde(default = "default_level_step")]
    pub step: u64,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_LEVEL_STEP,
        }
    }
}

/// Streak milestone settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreaksConfig {
    /// Milestone on every multiple of this many days
    #[serde(default = "default_milestone_every")]
    pub milestone_every: u32,

    /// Explicit milestone day counts; replaces `milestone_every` when set
    #[serde(default)]
    pub milestone_days: Vec<u32>,

    /// Milestone bonus per streak day
    #[serde(default = "default_bonus_per_day")]
    pub bonus_per_day: u64,
}

impl Default for StreaksConfig {
    fn default() -> Self {
        Self {
            milestone_every: DEFAULT_MILESTONE_EVERY,
            milestone_days: Vec::new(),
            bonus_per_day: DEFAULT_BONUS_PER_DAY,
        }
    }
}

/// Reference timezone for streak days
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimezoneConfig {
    /// IANA zone name, e.g. "America/New_York"; follows daylight saving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Minutes east of UTC when no name is set; 0 means UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Commit deadline for the reward transaction
    #[serde(default = "default_persist_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_persist_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        let limits = MetadataLimits::default();
        Self {
            max_keys: limits.max_keys,
            max_key_len: limits.max_key_len,
        }
    }
}

/// Main rewards configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Base XP per event wire name. Must list every event when present.
    #[serde(default = "EventRegistry::default_table")]
    pub base_xp: BTreeMap<String, u64>,

    #[serde(default)]
    pub levels: LevelsConfig,

    #[serde(default)]
    pub streaks: StreaksConfig,

    #[serde(default)]
    pub timezone: TimezoneConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub persist: PersistConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            base_xp: EventRegistry::default_table(),
            levels: LevelsConfig::default(),
            streaks: StreaksConfig::default(),
            timezone: TimezoneConfig::default(),
            guard: GuardConfig::default(),
            persist: PersistConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

/// Validated, ready-to-use rule set derived from configuration
#[derive(Debug, Clone)]
pub struct RewardRules {
    pub registry: EventRegistry,
    pub curve: LevelCurve,
    pub streak_policy: StreakPolicy,
    pub metadata_limits: MetadataLimits,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            registry: EventRegistry::with_defaults(),
            curve: LevelCurve::default(),
            streak_policy: StreakPolicy::default(),
            metadata_limits: MetadataLimits::default(),
        }
    }
}

impl RewardsConfig {
    /// Get default user config path: ~/.config/lumen/rewards.toml
    pub fn user_config_path() -> Result<PathBuf> {
        let home = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| Path::new(&h).join(".config")))
            .context("Cannot determine home directory")?;
        Ok(home.join("lumen").join("rewards.toml"))
    }

    /// Get system config path: /etc/lumen/rewards.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/lumen/rewards.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. `$LUMEN_CONFIG`
    /// 2. User config (~/.config/lumen/rewards.toml)
    /// 3. System config (/etc/lumen/rewards.toml)
    /// 4. Defaults
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from_path(Path::new(&explicit));
        }

        if let Ok(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_from_path(&user_path);
            }
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from_path(&system_path);
        }

        Ok(Self::default())
    }

    /// Load and validate a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RewardsConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize, e.g. for `lumenctl config --defaults`
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.rules().map(|_| ())?;
        if self.guard.lock_timeout_secs == 0 || self.guard.lock_timeout_secs > MAX_LOCK_TIMEOUT_SECS
        {
            return Err(DomainError::InvalidConfig(format!(
                "guard.lock_timeout_secs must be between 1 and {}",
                MAX_LOCK_TIMEOUT_SECS
            )));
        }
        if self.persist.timeout_ms == 0 {
            return Err(DomainError::InvalidConfig(
                "persist.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the validated rule set
    pub fn rules(&self) -> Result<RewardRules, DomainError> {
        let registry = EventRegistry::from_table(&self.base_xp)?;
        let curve = LevelCurve::new(self.levels.step)?;

        let milestones = if self.streaks.milestone_days.is_empty() {
            if self.streaks.milestone_every == 0 {
                return Err(DomainError::InvalidConfig(
                    "streaks.milestone_every must be greater than zero".to_string(),
                ));
            }
            MilestoneRule::Every(self.streaks.milestone_every)
        } else {
            let mut days = self.streaks.milestone_days.clone();
            days.sort_unstable();
            days.dedup();
            MilestoneRule::Days(days)
        };

        let timezone = match (&self.timezone.name, self.timezone.utc_offset_minutes) {
            (Some(_), offset) if offset != 0 => {
                return Err(DomainError::InvalidConfig(
                    "timezone.name and timezone.utc_offset_minutes are mutually exclusive"
                        .to_string(),
                ))
            }
            (Some(name), _) => TimezonePolicy::named(name)?,
            (None, 0) => TimezonePolicy::Utc,
            (None, offset) => TimezonePolicy::fixed_minutes(offset)?,
        };

        Ok(RewardRules {
            registry,
            curve,
            streak_policy: StreakPolicy {
                timezone,
                milestones,
                bonus_per_day: self.streaks.bonus_per_day,
            },
            metadata_limits: MetadataLimits {
                max_keys: self.metadata.max_keys,
                max_key_len: self.metadata.max_key_len,
            },
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.guard.lock_timeout_secs)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist.timeout_ms)
    }
}

fn default_level_step() -> u64 {
    DEFAULT_LEVEL_STEP
}

fn default_milestone_every() -> u32 {
    DEFAULT_MILESTONE_EVERY
}

fn default_bonus_per_day() -> u64 {
    DEFAULT_BONUS_PER_DAY
}

fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

fn default_persist_timeout_ms() -> u64 {
    DEFAULT_PERSIST_TIMEOUT_MS
}

fn default_max_keys() -> usize {
    MetadataLimits::default().max_keys
}

fn default_max_key_len() -> usize {
    MetadataLimits::default().max_key_len
}
