//! Lumen Common - reward engine runtime
//!
//! Configuration, storage, per-user locking and the transaction coordinator
//! that turns activity events into XP, streaks and levels.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RewardRules, RewardsConfig};
pub use coordinator::{ProfileSummary, RewardCoordinator};
pub use error::{ErrorKind, RewardError, StoreError};
pub use fanout::{AssessmentSubmission, FanOutAdapter, FanOutReport, TriggerFailure, TriggerOutcome};
pub use guard::{ConcurrencyGuard, InMemoryGuard, Lease, LockToken};
pub use store::{CancelSignal, CancelTrigger, CommitGate, RewardCommit, RewardStore, SqliteRewardStore};
