//! Command handlers for lumenctl.
//!
//! Every handler returns the JSON document that `main` prints.

use anyhow::{bail, Context as _, Result};
use lumen_common::store::RewardStore;
use lumen_common::{
    AssessmentSubmission, FanOutAdapter, RewardCoordinator, RewardsConfig, SqliteRewardStore,
};
use lumen_shared::{EventKind, Metadata, UserId};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Resolved command-line environment
pub struct Context {
    pub db_path: PathBuf,
    pub config: RewardsConfig,
}

impl Context {
    /// Use `config_path` when given, otherwise the usual lookup order
    pub fn load(db_path: PathBuf, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => RewardsConfig::load_from_path(path)?,
            None => RewardsConfig::load()?,
        };
        Ok(Self { db_path, config })
    }

    pub fn with_config(db_path: PathBuf, config: RewardsConfig) -> Self {
        Self { db_path, config }
    }

    async fn store(&self) -> Result<Arc<SqliteRewardStore>> {
        let store = SqliteRewardStore::open(&self.db_path)
            .await
            .with_context(|| format!("Failed to open database {}", self.db_path.display()))?;
        Ok(Arc::new(store))
    }

    async fn coordinator(&self) -> Result<(Arc<SqliteRewardStore>, Arc<RewardCoordinator>)> {
        let store = self.store().await?;
        let coordinator = RewardCoordinator::from_config(&self.config, store.clone())
            .context("Invalid rewards configuration")?;
        Ok((store, Arc::new(coordinator)))
    }
}

/// Parse repeated `key=value` flags. Values that parse as JSON keep their
/// type, anything else is stored as a string.
pub fn parse_meta(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Metadata must be key=value, got '{}'", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        metadata.insert(key.trim().to_string(), value);
    }
    Ok(metadata)
}

pub async fn init(ctx: &Context) -> Result<Value> {
    let store = ctx.store().await?;
    info!(db = %ctx.db_path.display(), "Reward database ready");
    Ok(json!({
        "db": store.path().map(|p| p.display().to_string()),
        "events": EventKind::ALL.iter().map(|kind| kind.as_str()).collect::<Vec<_>>(),
        "level_step": ctx.config.levels.step,
    }))
}

pub async fn add_user(ctx: &Context, user: i64) -> Result<Value> {
    let store = ctx.store().await?;
    let profile = store.create_profile(UserId(user)).await?;
    Ok(serde_json::to_value(profile)?)
}

pub async fn event(ctx: &Context, user: i64, event: &str, meta: &[String]) -> Result<Value> {
    let metadata = parse_meta(meta)?;
    let (_store, coordinator) = ctx.coordinator().await?;
    let adapter = FanOutAdapter::new(coordinator.clone());

    let outcome = adapter.trigger_event(UserId(user), event, metadata).await;
    coordinator.shutdown();
    Ok(serde_json::to_value(outcome)?)
}

pub async fn assessment(
    ctx: &Context,
    user: i64,
    assessment_id: String,
    correct: u32,
    total: u32,
) -> Result<Value> {
    let (_store, coordinator) = ctx.coordinator().await?;
    let adapter = FanOutAdapter::new(coordinator.clone());
    let submission = AssessmentSubmission {
        assessment_id,
        correct,
        total,
    };

    let report = adapter.submit_assessment(UserId(user), &submission).await;
    coordinator.shutdown();
    let report = report?;
    Ok(json!({
        "success": report.all_succeeded(),
        "total_xp": report.total_xp(),
        "results": report.results,
    }))
}

pub async fn profile(ctx: &Context, user: i64) -> Result<Value> {
    let (_store, coordinator) = ctx.coordinator().await?;
    let summary = coordinator.profile_summary(UserId(user)).await?;
    Ok(serde_json::to_value(summary)?)
}

pub async fn history(ctx: &Context, user: i64, limit: usize) -> Result<Value> {
    let (store, coordinator) = ctx.coordinator().await?;
    let activity = coordinator.recent_activity(UserId(user), limit).await?;
    let streaks = store.recent_streak_entries(UserId(user), limit).await?;
    Ok(json!({
        "activity": activity,
        "streaks": streaks,
    }))
}

/// Recompute stored levels after a level-step change
pub async fn rederive(ctx: &Context) -> Result<Value> {
    let rules = ctx.config.rules()?;
    let store = ctx.store().await?;
    let updated = store.rederive_levels(rules.curve).await?;
    info!(updated, step = rules.curve.step(), "Levels re-derived");
    Ok(json!({ "updated": updated, "level_step": rules.curve.step() }))
}

pub fn config(ctx: &Context, defaults: bool) -> Result<String> {
    if defaults {
        RewardsConfig::default().to_toml_string()
    } else {
        ctx.config.to_toml_string()
    }
}
