//! Multi-event workflows built on the coordinator.
//!
//! Each event goes through the coordinator on its own. A failure in a later
//! event leaves earlier, already committed events in place.

use crate::coordinator::RewardCoordinator;
use crate::error::RewardError;
use lumen_shared::{EventKind, Metadata, RewardResult, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Caller-facing view of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFailure {
    pub code: String,
    pub status: u16,
    pub message: String,
    pub retryable: bool,
}

impl From<&RewardError> for TriggerFailure {
    fn from(err: &RewardError) -> Self {
        Self {
            code: err.code().to_string(),
            status: err.status_code(),
            message: err.public_message(),
            retryable: err.is_retryable(),
        }
    }
}

/// `{success, data}` envelope returned per triggered event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RewardResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TriggerFailure>,
}

impl From<Result<RewardResult, RewardError>> for TriggerOutcome {
    fn from(result: Result<RewardResult, RewardError>) -> Self {
        match result {
            Ok(reward) => Self {
                success: true,
                data: Some(reward),
                error: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(TriggerFailure::from(&err)),
            },
        }
    }
}

/// Results of a workflow, keyed by event wire name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutReport {
    pub results: BTreeMap<String, TriggerOutcome>,
}

impl FanOutReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|outcome| outcome.success)
    }

    /// XP earned by the events that committed
    pub fn total_xp(&self) -> u64 {
        self.results
            .values()
            .filter_map(|outcome| outcome.data.as_ref())
            .map(|reward| reward.total_xp)
            .sum()
    }

    pub fn get(&self, event: EventKind) -> Option<&TriggerOutcome> {
        self.results.get(event.as_str())
    }
}

/// A graded quiz or exam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentSubmission {
    pub assessment_id: String,
    pub correct: u32,
    pub total: u32,
}

impl AssessmentSubmission {
    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.correct == self.total
    }

    /// Accuracy in percent, 0 for an empty assessment
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) * 100.0 / f64::from(self.total)
        }
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("assessment_id".into(), json!(self.assessment_id));
        metadata.insert("correct".into(), json!(self.correct));
        metadata.insert("total".into(), json!(self.total));
        metadata.insert("accuracy".into(), json!(self.accuracy()));
        metadata
    }
}

pub struct FanOutAdapter {
    coordinator: Arc<RewardCoordinator>,
}

impl FanOutAdapter {
    pub fn new(coordinator: Arc<RewardCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<RewardCoordinator> {
        &self.coordinator
    }

    /// Run one event and wrap the result for the caller
    pub async fn trigger_event(
        &self,
        user_id: UserId,
        event_name: &str,
        metadata: Metadata,
    ) -> TriggerOutcome {
        self.coordinator
            .process_event(user_id, event_name, metadata)
            .await
            .into()
    }

    /// Run events one after another. Every event is attempted even when an
    /// earlier one failed.
    ///
    /// The report is keyed by event name, so a sequence naming the same event
    /// twice is rejected before anything runs.
    pub async fn trigger_sequence(
        &self,
        user_id: UserId,
        events: Vec<(String, Metadata)>,
    ) -> Result<FanOutReport, RewardError> {
        let mut seen = BTreeSet::new();
        for (event_name, _) in &events {
            if !seen.insert(event_name.trim()) {
                return Err(RewardError::InvalidEvent(format!(
                    "{} appears more than once in one sequence",
                    event_name.trim()
                )));
            }
        }

        let mut report = FanOutReport::default();
        for (event_name, metadata) in events {
            let outcome = self.trigger_event(user_id, &event_name, metadata).await;
            if !outcome.success {
                warn!(user_id = %user_id, event = %event_name, "Fan-out event failed");
            }
            report.results.insert(event_name.trim().to_string(), outcome);
        }
        Ok(report)
    }

    /// Award a completed assessment: `COMPLETE_QUIZ`, then `PERFECT_SCORE`
    /// when every answer was correct.
    pub async fn submit_assessment(
        &self,
        user_id: UserId,
        submission: &AssessmentSubmission,
    ) -> Result<FanOutReport, RewardError> {
        if submission.correct > submission.total {
            return Err(RewardError::InvalidMetadata(format!(
                "{} correct answers out of {}",
                submission.correct, submission.total
            )));
        }

        let metadata = submission.metadata();
        let mut events = vec![(EventKind::CompleteQuiz.as_str().to_string(), metadata.clone())];
        if submission.is_perfect() {
            events.push((EventKind::PerfectScore.as_str().to_string(), metadata));
        }

        let report = self.trigger_sequence(user_id, events).await?;
        info!(
            user_id = %user_id,
            assessment_id = %submission.assessment_id,
            events = report.results.len(),
            xp = report.total_xp(),
            "Assessment processed"
        );
        Ok(report)
    }
}
