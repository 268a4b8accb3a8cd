//! End-to-end reward scenarios against an in-memory SQLite store.
//!
//! Covers first login, streak continuation into a milestone, gap reset,
//! same-day idempotence, XP/level monotonicity and the fan-out workflow.

mod common;

use common::{FlakyStore, Harness, ALICE, BOB};
use lumen_common::store::RewardStore;
use lumen_common::{AssessmentSubmission, FanOutAdapter, RewardError, RewardRules};
use lumen_shared::{
    ActivityCategory, EventKind, LevelCurve, Metadata, MilestoneRule, StreakPolicy, TimezonePolicy,
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

fn rules_with_milestones(days: Vec<u32>) -> RewardRules {
    RewardRules {
        streak_policy: StreakPolicy {
            milestones: MilestoneRule::Days(days),
            ..StreakPolicy::default()
        },
        ..RewardRules::default()
    }
}

#[tokio::test]
async fn test_first_login() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    assert_eq!(h.current_entries(ALICE).await, 0);

    let reward = h
        .coordinator
        .process_event(ALICE, "DAILY_LOGIN", Metadata::new())
        .await
        .unwrap();

    assert_eq!(reward.event, EventKind::DailyLogin);
    assert_eq!(reward.total_xp, 10);
    assert_eq!(reward.streak.previous_streak, 0);
    assert_eq!(reward.streak.current_streak, 1);
    assert!(reward.streak.streak_updated);
    assert!(!reward.streak_milestone_reached);
    assert_eq!(reward.new_level, 1);

    let profile = h.profile(ALICE).await;
    assert_eq!(profile.total_xp, 10);
    assert_eq!(profile.current_streak, 1);
    assert_eq!(profile.longest_streak, 1);
    assert_eq!(profile.last_active_date, Some(common::start_time().date_naive()));
    assert_eq!(h.current_entries(ALICE).await, 1);

    let activity = h.db.recent_activity(ALICE, 10).await.unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].category, ActivityCategory::Login);
    assert_eq!(activity[0].xp_earned, 10);
    assert!(activity[0].streak_updated);
}

#[tokio::test]
async fn test_consecutive_day_reaches_milestone() {
    let h = Harness::with_rules(rules_with_milestones(vec![8])).await;
    h.add_user(ALICE).await;

    h.login_days(ALICE, 7).await;
    let profile = h.profile(ALICE).await;
    assert_eq!(profile.current_streak, 7);
    assert_eq!(profile.total_xp, 70);

    h.next_day();
    let reward = h
        .coordinator
        .process_event(ALICE, "DAILY_LOGIN", Metadata::new())
        .await
        .unwrap();

    assert_eq!(reward.streak.previous_streak, 7);
    assert_eq!(reward.streak.current_streak, 8);
    assert!(reward.streak_milestone_reached);
    assert_eq!(reward.streak_bonus, 80);
    assert_eq!(reward.total_xp, 90);
    assert_eq!(reward.new_total_xp, 160);
    assert_eq!(reward.previous_level, 1);
    assert_eq!(reward.new_level, 2);
    assert!(reward.leveled_up());

    let activity = h.db.recent_activity(ALICE, 1).await.unwrap();
    assert!(activity[0].description.contains("8-day streak bonus"));
    assert_eq!(h.current_entries(ALICE).await, 1);
    assert_eq!(h.db.streak_history(ALICE).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_gap_resets_streak_but_keeps_longest() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    h.login_days(ALICE, 20).await;
    assert_eq!(h.profile(ALICE).await.current_streak, 20);

    // Skip a whole day
    h.next_day();
    h.next_day();
    let reward = h
        .coordinator
        .process_event(ALICE, "COMPLETE_LESSON", Metadata::new())
        .await
        .unwrap();

    assert_eq!(reward.streak.previous_streak, 20);
    assert_eq!(reward.streak.current_streak, 1);
    assert_eq!(reward.streak.longest_streak, 20);
    assert!(!reward.streak_milestone_reached);

    let profile = h.profile(ALICE).await;
    assert_eq!(profile.current_streak, 1);
    assert_eq!(profile.longest_streak, 20);
    assert_eq!(h.current_entries(ALICE).await, 1);
}

#[tokio::test]
async fn test_same_day_events_accrue_xp_without_touching_streak() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;

    let first = h
        .coordinator
        .process_event(ALICE, "COMPLETE_LESSON", Metadata::new())
        .await
        .unwrap();
    let second = h
        .coordinator
        .process_event(ALICE, "CREATE_POST", Metadata::new())
        .await
        .unwrap();

    assert!(first.streak.streak_updated);
    assert!(!second.streak.streak_updated);
    assert_eq!(second.streak.current_streak, 1);
    assert_eq!(second.total_xp, 15);
    assert_eq!(second.new_total_xp, 65);

    let history = h.db.streak_history(ALICE).await.unwrap();
    assert_eq!(history.len(), 1);

    let activity = h.db.recent_activity(ALICE, 10).await.unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].event_type, EventKind::CreatePost);
    assert!(!activity[0].streak_updated);
}

#[tokio::test]
async fn test_xp_and_level_stay_consistent() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    let curve = LevelCurve::default();

    let plan = [
        ("DAILY_LOGIN", 0),
        ("COMPLETE_COURSE", 0),
        ("RECEIVE_LIKE", 1),
        ("COMPLETE_QUIZ", 1),
        ("HELP_ANSWER_ACCEPTED", 3),
        ("COMPLETE_COURSE", 1),
        ("CREATE_COMMENT", 0),
    ];

    let mut last_total = 0;
    for (event, days_later) in plan {
        for _ in 0..days_later {
            h.next_day();
        }
        let reward = h
            .coordinator
            .process_event(ALICE, event, Metadata::new())
            .await
            .unwrap();
        assert!(reward.new_total_xp >= last_total);
        last_total = reward.new_total_xp;

        let profile = h.profile(ALICE).await;
        assert_eq!(profile.total_xp, last_total);
        assert_eq!(profile.current_level, curve.level_of(profile.total_xp));
        assert!(profile.longest_streak >= profile.current_streak);
        assert_eq!(h.current_entries(ALICE).await, 1);
    }
}

#[tokio::test]
async fn test_metadata_passes_through_to_activity_log() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;

    let mut metadata = Metadata::new();
    metadata.insert("lesson_id".into(), json!("rust-101"));
    metadata.insert("duration_secs".into(), json!(540));

    h.coordinator
        .process_event(ALICE, "COMPLETE_LESSON", metadata.clone())
        .await
        .unwrap();

    let activity = h.db.recent_activity(ALICE, 1).await.unwrap();
    assert_eq!(activity[0].metadata, metadata);
}

#[tokio::test]
async fn test_profile_summary_reports_progress() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    h.coordinator
        .process_event(ALICE, "COMPLETE_COURSE", Metadata::new())
        .await
        .unwrap();

    let summary = h.coordinator.profile_summary(ALICE).await.unwrap();
    assert_eq!(summary.profile.total_xp, 500);
    assert_eq!(summary.progress.current_level, 3);
    assert_eq!(summary.progress.xp_remaining, 100);
    assert_eq!(summary.current_entry.map(|e| e.streak_length), Some(1));

    assert!(matches!(
        h.coordinator.profile_summary(BOB).await,
        Err(RewardError::UserNotFound(_))
    ));
    assert!(matches!(
        h.coordinator.recent_activity(BOB, 5).await,
        Err(RewardError::UserNotFound(_))
    ));
}

#[tokio::test]
async fn test_assessment_fan_out_awards_both_events() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    let adapter = FanOutAdapter::new(h.coordinator.clone());

    let report = adapter
        .submit_assessment(
            ALICE,
            &AssessmentSubmission {
                assessment_id: "quiz-7".into(),
                correct: 12,
                total: 12,
            },
        )
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.total_xp(), 80);
    assert!(report.get(EventKind::CompleteQuiz).unwrap().success);
    assert!(report.get(EventKind::PerfectScore).unwrap().success);

    let activity = h.db.recent_activity(ALICE, 10).await.unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[1].metadata["assessment_id"], json!("quiz-7"));
    assert_eq!(activity[1].metadata["accuracy"], json!(100.0));
}

#[tokio::test]
async fn test_imperfect_assessment_skips_perfect_score() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    let adapter = FanOutAdapter::new(h.coordinator.clone());

    let report = adapter
        .submit_assessment(
            ALICE,
            &AssessmentSubmission {
                assessment_id: "quiz-8".into(),
                correct: 9,
                total: 10,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(report.get(EventKind::PerfectScore).is_none());
    assert_eq!(h.profile(ALICE).await.total_xp, 30);

    let bad = adapter
        .submit_assessment(
            ALICE,
            &AssessmentSubmission {
                assessment_id: "quiz-9".into(),
                correct: 11,
                total: 10,
            },
        )
        .await;
    assert!(matches!(bad, Err(RewardError::InvalidMetadata(_))));
    assert_eq!(h.profile(ALICE).await.total_xp, 30);
}

#[tokio::test]
async fn test_fan_out_failure_keeps_earlier_event() {
    let db = Arc::new(lumen_common::SqliteRewardStore::open_in_memory().await.unwrap());
    let flaky = Arc::new(FlakyStore::new(db.clone()).failing_on(2));
    let h = Harness::build(db, flaky.clone(), RewardRules::default());
    h.add_user(ALICE).await;
    let adapter = FanOutAdapter::new(h.coordinator.clone());

    let report = adapter
        .submit_assessment(
            ALICE,
            &AssessmentSubmission {
                assessment_id: "final".into(),
                correct: 5,
                total: 5,
            },
        )
        .await
        .unwrap();

    assert!(!report.all_succeeded());
    assert!(report.get(EventKind::CompleteQuiz).unwrap().success);
    let failed = report.get(EventKind::PerfectScore).unwrap();
    assert!(!failed.success);
    let failure = failed.error.as_ref().unwrap();
    assert_eq!(failure.status, 500);
    assert_eq!(failure.message, "internal server error");
    assert_eq!(flaky.attempts(), 2);

    let profile = h.profile(ALICE).await;
    assert_eq!(profile.total_xp, 30);
    assert_eq!(h.db.recent_activity(ALICE, 10).await.unwrap().len(), 1);
    assert!(h.guard.held().is_empty());
}

#[tokio::test]
async fn test_trigger_event_envelope_for_unknown_event() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    let adapter = FanOutAdapter::new(h.coordinator.clone());

    let outcome = adapter
        .trigger_event(ALICE, "TELEPORT", Metadata::new())
        .await;
    assert!(!outcome.success);
    let failure = outcome.error.unwrap();
    assert_eq!(failure.status, 400);
    assert_eq!(failure.message, "invalid event");

    let ok = adapter
        .trigger_event(ALICE, " DAILY_LOGIN ", Metadata::new())
        .await;
    assert!(ok.success);
    assert_eq!(ok.data.unwrap().total_xp, 10);
}

#[tokio::test]
async fn test_sequence_with_repeated_event_rejected_before_running() {
    let h = Harness::new().await;
    h.add_user(ALICE).await;
    let adapter = FanOutAdapter::new(h.coordinator.clone());

    let result = adapter
        .trigger_sequence(
            ALICE,
            vec![
                ("COMPLETE_LESSON".to_string(), Metadata::new()),
                (" COMPLETE_LESSON".to_string(), Metadata::new()),
            ],
        )
        .await;
    assert!(matches!(result, Err(RewardError::InvalidEvent(_))));
    assert_eq!(h.profile(ALICE).await.total_xp, 0);
    assert!(h.db.recent_activity(ALICE, 10).await.unwrap().is_empty());

    let report = adapter
        .trigger_sequence(
            ALICE,
            vec![
                ("COMPLETE_LESSON".to_string(), Metadata::new()),
                ("DAILY_LOGIN".to_string(), Metadata::new()),
            ],
        )
        .await
        .unwrap();
    let committed = h.db.recent_activity(ALICE, 10).await.unwrap().len();
    assert_eq!(report.results.len(), committed);
    assert_eq!(report.total_xp(), h.profile(ALICE).await.total_xp);
}

#[tokio::test]
async fn test_late_night_logins_across_spring_forward() {
    let h = Harness::with_rules(RewardRules {
        streak_policy: StreakPolicy {
            timezone: TimezonePolicy::named("America/New_York").unwrap(),
            ..StreakPolicy::default()
        },
        ..RewardRules::default()
    })
    .await;
    h.add_user(ALICE).await;

    // 23:30 local on Mar 9 (EST), Mar 10 (EDT), then 00:30 EDT on Mar 11
    for (utc, expected) in [
        (Utc.with_ymd_and_hms(2024, 3, 10, 4, 30, 0).unwrap(), 1),
        (Utc.with_ymd_and_hms(2024, 3, 11, 3, 30, 0).unwrap(), 2),
        (Utc.with_ymd_and_hms(2024, 3, 11, 4, 30, 0).unwrap(), 3),
    ] {
        h.clock.set(utc);
        let reward = h
            .coordinator
            .process_event(ALICE, "DAILY_LOGIN", Metadata::new())
            .await
            .unwrap();
        assert_eq!(reward.streak.current_streak, expected);
    }

    let profile = h.profile(ALICE).await;
    assert_eq!(profile.current_streak, 3);
    assert_eq!(h.current_entries(ALICE).await, 1);
}
