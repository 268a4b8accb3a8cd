//! SQLite-backed reward store.
//!
//! Single connection behind a tokio mutex; all SQL runs on the blocking pool.
//! A partial unique index keeps at most one current streak row per user.

use super::{CommitGate, RewardCommit, RewardStore};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lumen_shared::{
    ActivityLogEntry, EventKind, LevelCurve, StreakHistoryEntry, UserGameProfile, UserId,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_game_profile (
    user_id INTEGER PRIMARY KEY,
    total_xp INTEGER NOT NULL DEFAULT 0,
    current_level INTEGER NOT NULL DEFAULT 1,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_active_date TEXT,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS streak_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES user_game_profile(user_id),
    streak_date TEXT NOT NULL,
    streak_length INTEGER NOT NULL,
    is_current INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_streak_one_current
    ON streak_history(user_id) WHERE is_current = 1;

CREATE INDEX IF NOT EXISTS idx_streak_user_date
    ON streak_history(user_id, streak_date);

CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES user_game_profile(user_id),
    event_type TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT NOT NULL,
    xp_earned INTEGER NOT NULL,
    previous_streak INTEGER NOT NULL,
    new_streak INTEGER NOT NULL,
    previous_level INTEGER NOT NULL,
    new_level INTEGER NOT NULL,
    streak_updated INTEGER NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_user
    ON activity_log(user_id, id);
";

pub struct SqliteRewardStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteRewardStore {
    /// Open or create a database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        info!("Opening reward database at: {}", path.display());

        let db_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = Connection::open(&db_path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(conn)
        })
        .await??;

        Self::from_connection(conn, Some(path)).await
    }

    /// Private in-memory database, for tests and dry runs
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None).await
    }

    async fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };
        store
            .with_conn(|conn| {
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await?
    }

    /// Register a user with an empty profile
    pub async fn create_profile(&self, user_id: UserId) -> Result<UserGameProfile, StoreError> {
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_game_profile (user_id) VALUES (?1)",
                params![user_id.0],
            )?;
            if inserted == 0 {
                return Err(StoreError::DuplicateProfile(user_id));
            }
            Ok(UserGameProfile::new(user_id))
        })
        .await
    }

    /// Recompute every stored level from total XP after a curve change.
    /// Returns how many rows changed.
    pub async fn rederive_levels(&self, curve: LevelCurve) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let rows: Vec<(i64, i64, i64)> = {
                let mut stmt =
                    tx.prepare("SELECT user_id, total_xp, current_level FROM user_game_profile")?;
                let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                let collected = mapped.collect::<Result<Vec<_>, _>>()?;
                collected
            };

            let mut changed = 0;
            for (user_id, total_xp, stored_level) in rows {
                let level = curve.level_of(to_u64(total_xp, "total_xp")?);
                if i64::from(level) != stored_level {
                    tx.execute(
                        "UPDATE user_game_profile SET current_level = ?1, updated_at = CURRENT_TIMESTAMP
                         WHERE user_id = ?2",
                        params![level, user_id],
                    )?;
                    changed += 1;
                }
            }
            tx.commit()?;
            Ok(changed)
        })
        .await
    }

    /// Full streak history for a user, newest first
    pub async fn streak_history(&self, user_id: UserId) -> Result<Vec<StreakHistoryEntry>, StoreError> {
        self.recent_streak_entries(user_id, usize::MAX).await
    }
}

#[async_trait]
impl RewardStore for SqliteRewardStore {
    async fn load_profile(&self, user_id: UserId) -> Result<Option<UserGameProfile>, StoreError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT total_xp, current_level, current_streak, longest_streak, last_active_date
                     FROM user_game_profile WHERE user_id = ?1",
                    params![user_id.0],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, Option<NaiveDate>>(4)?,
                        ))
                    },
                )
                .optional()?;

            row.map(
                |(total_xp, level, current, longest, last_active_date)| -> Result<_, StoreError> {
                    Ok(UserGameProfile {
                        user_id,
                        total_xp: to_u64(total_xp, "total_xp")?,
                        current_level: to_u32(level, "current_level")?,
                        current_streak: to_u32(current, "current_streak")?,
                        longest_streak: to_u32(longest, "longest_streak")?,
                        last_active_date,
                    })
                },
            )
            .transpose()
        })
        .await
    }

    async fn latest_current_entry(
        &self,
        user_id: UserId,
    ) -> Result<Option<StreakHistoryEntry>, StoreError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT streak_date, streak_length FROM streak_history
                     WHERE user_id = ?1 AND is_current = 1",
                    params![user_id.0],
                    |row| Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            row.map(|(streak_date, length)| -> Result<_, StoreError> {
                Ok(StreakHistoryEntry {
                    streak_date,
                    streak_length: to_u32(length, "streak_length")?,
                    is_current: true,
                })
            })
            .transpose()
        })
        .await
    }

    async fn recent_streak_entries(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StreakHistoryEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT streak_date, streak_length, is_current FROM streak_history
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id.0, limit], |row| {
                    Ok((
                        row.get::<_, NaiveDate>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(streak_date, length, is_current)| -> Result<_, StoreError> {
                    Ok(StreakHistoryEntry {
                        streak_date,
                        streak_length: to_u32(length, "streak_length")?,
                        is_current,
                    })
                })
                .collect()
        })
        .await
    }

    async fn recent_activity(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_type, description, xp_earned, previous_streak, new_streak,
                        previous_level, new_level, streak_updated, metadata, created_at
                 FROM activity_log WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id.0, limit], |row| {
                    Ok(RawActivity {
                        event_type: row.get(0)?,
                        description: row.get(1)?,
                        xp_earned: row.get(2)?,
                        previous_streak: row.get(3)?,
                        new_streak: row.get(4)?,
                        previous_level: row.get(5)?,
                        new_level: row.get(6)?,
                        streak_updated: row.get(7)?,
                        metadata: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(|raw| raw.into_entry(user_id)).collect()
        })
        .await
    }

    async fn commit(&self, commit: RewardCommit, gate: CommitGate) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            save_profile(&tx, &commit.profile)?;
            if let Some(entry) = &commit.new_streak_entry {
                close_current_and_open_new(&tx, commit.profile.user_id, entry)?;
            }
            append_activity(&tx, &commit.activity)?;

            // Dropping `tx` on an early return rolls everything back
            gate.check()?;
            tx.commit()?;

            debug!(
                user_id = %commit.profile.user_id,
                total_xp = commit.profile.total_xp,
                "Reward transaction committed"
            );
            Ok(())
        })
        .await
    }
}

fn save_profile(tx: &Transaction<'_>, profile: &UserGameProfile) -> Result<(), StoreError> {
    let updated = tx.execute(
        "UPDATE user_game_profile
         SET total_xp = ?1, current_level = ?2, current_streak = ?3, longest_streak = ?4,
             last_active_date = ?5, updated_at = CURRENT_TIMESTAMP
         WHERE user_id = ?6",
        params![
            to_i64(profile.total_xp, "total_xp")?,
            profile.current_level,
            profile.current_streak,
            profile.longest_streak,
            profile.last_active_date,
            profile.user_id.0,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::MissingProfile(profile.user_id));
    }
    Ok(())
}

fn close_current_and_open_new(
    tx: &Transaction<'_>,
    user_id: UserId,
    entry: &StreakHistoryEntry,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE streak_history SET is_current = 0 WHERE user_id = ?1 AND is_current = 1",
        params![user_id.0],
    )?;
    tx.execute(
        "INSERT INTO streak_history (user_id, streak_date, streak_length, is_current)
         VALUES (?1, ?2, ?3, 1)",
        params![user_id.0, entry.streak_date, entry.streak_length],
    )?;
    Ok(())
}

fn append_activity(tx: &Transaction<'_>, entry: &ActivityLogEntry) -> Result<(), StoreError> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    tx.execute(
        "INSERT INTO activity_log (
            user_id, event_type, category, description, xp_earned,
            previous_streak, new_streak, previous_level, new_level,
            streak_updated, metadata, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.user_id.0,
            entry.event_type.as_str(),
            entry.category.as_str(),
            entry.description,
            to_i64(entry.xp_earned, "xp_earned")?,
            entry.previous_streak,
            entry.new_streak,
            entry.previous_level,
            entry.new_level,
            entry.streak_updated,
            metadata,
            entry.created_at,
        ],
    )?;
    Ok(())
}

struct RawActivity {
    event_type: String,
    description: String,
    xp_earned: i64,
    previous_streak: i64,
    new_streak: i64,
    previous_level: i64,
    new_level: i64,
    streak_updated: bool,
    metadata: String,
    created_at: DateTime<Utc>,
}

impl RawActivity {
    fn into_entry(self, user_id: UserId) -> Result<ActivityLogEntry, StoreError> {
        let event_type = EventKind::parse(&self.event_type)
            .map_err(|_| StoreError::Corrupt(format!("unknown event type '{}'", self.event_type)))?;
        Ok(ActivityLogEntry {
            user_id,
            event_type,
            category: event_type.category(),
            description: self.description,
            xp_earned: to_u64(self.xp_earned, "xp_earned")?,
            previous_streak: to_u32(self.previous_streak, "previous_streak")?,
            new_streak: to_u32(self.new_streak, "new_streak")?,
            previous_level: to_u32(self.previous_level, "previous_level")?,
            new_level: to_u32(self.new_level, "new_level")?,
            streak_updated: self.streak_updated,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: self.created_at,
        })
    }
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} is negative: {}", column, value)))
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}
