//! End-to-end tests for notification runs
//!
//! Drives the full classify → resolve → dispatch → report pipeline against the
//! in-memory store and the mock channel, plus property tests for the
//! classifier and run accounting.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use crate::channels::mock::MockChannel;
use crate::maintenance::{
    classifier::classify,
    config::EngineConfig,
    coordinator::{NotificationEngine, RunState},
    error::{EngineError, StoreError},
    provider::ControlSource,
    types::*,
};
use crate::store::InMemoryMaintenanceStore;

const TECH_A: &str = "a.tech@diacare.test";
const ADMIN_B: &str = "b.admin@diacare.test";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 7, 30, 0).unwrap()
}

fn machine(id: i64, technician: Option<&str>) -> Machine {
    Machine {
        id,
        name: format!("Dialysis machine {}", id),
        location: Some("Ward A".to_string()),
        technician: technician.map(|t| Recipient::technician(t, None)),
    }
}

fn control(id: i64, machine_id: i64, due: DateTime<Utc>, status: ControlStatus) -> MaintenanceControl {
    MaintenanceControl {
        id,
        machine_id,
        control_type: ControlType::Preventive,
        due_date: due,
        status,
        last_notified_at: None,
    }
}

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_horizon_days(3)
        .with_admins([ADMIN_B])
}

fn engine(
    store: &Arc<InMemoryMaintenanceStore>,
    channel: &Arc<MockChannel>,
    config: EngineConfig,
) -> NotificationEngine {
    NotificationEngine::new(config, store.clone(), store.clone(), channel.clone())
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn upcoming_control_notifies_assigned_technician() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(10, 1, now() + Duration::days(2), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(
        report.counts,
        RunCounts {
            upcoming_found: 1,
            overdue_found: 0,
            sent: 1,
            failed: 0,
            skipped: 0,
            unreadable: 0,
        }
    );
    assert_eq!(report.outcomes[0].recipient.as_deref(), Some(TECH_A));
    assert_eq!(channel.sent_to(TECH_A), 1);
    assert_eq!(store.control(10).unwrap().last_notified_at, Some(now()));
}

#[tokio::test]
async fn overdue_control_escalates_and_reports_partial_failure() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(20, 1, now() - Duration::days(5), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new().failing_for(ADMIN_B));

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(report.counts.overdue_found, 1);
    assert_eq!(report.counts.sent, 1);
    assert_eq!(report.counts.failed, 1);

    let failed = report
        .outcomes
        .iter()
        .find(|o| o.recipient.as_deref() == Some(ADMIN_B))
        .unwrap();
    assert!(!failed.success);
    assert!(failed.error_detail.is_some());
    assert_eq!(failed.urgency, Some(Urgency::Overdue));

    // One success is enough to stamp the control.
    assert_eq!(store.control(20).unwrap().last_notified_at, Some(now()));
}

#[tokio::test]
async fn completed_past_due_control_is_ignored() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(30, 1, now() - Duration::days(2), ControlStatus::Completed));
    let channel = Arc::new(MockChannel::new());

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(report.counts, RunCounts::default());
    assert!(report.outcomes.is_empty());
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn deleted_machine_is_one_failed_outcome_and_run_continues() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(2, Some(TECH_A)));
    store.insert_control(control(40, 99, now() - Duration::days(1), ControlStatus::Pending));
    store.insert_control(control(41, 2, now() + Duration::days(1), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    let orphan: Vec<&OutcomeEntry> = report.outcomes.iter().filter(|o| o.control_id == 40).collect();
    assert_eq!(orphan.len(), 1);
    assert!(!orphan[0].success);
    assert!(orphan[0].recipient.is_none());
    assert!(orphan[0]
        .error_detail
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("unresolved machine"));

    assert!(report.outcomes.iter().any(|o| o.control_id == 41 && o.success));
    assert_eq!(report.counts.sent, 1);
    assert_eq!(report.counts.failed, 1);
}

// =============================================================================
// RUN BEHAVIOUR
// =============================================================================

#[tokio::test]
async fn unreadable_control_source_aborts_the_run() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.fail_reads(true);
    let channel = Arc::new(MockChannel::new());

    let result = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Manual)
        .await;

    assert!(matches!(result, Err(EngineError::ClassificationSource(_))));
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn machine_lookup_error_is_per_item_failure() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(50, 1, now() + Duration::days(1), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());

    // Controls list fine, but machine lookups share the same read switch:
    // build a separate directory that always fails.
    let failing_directory = Arc::new(InMemoryMaintenanceStore::new());
    failing_directory.fail_reads(true);

    let engine = NotificationEngine::new(config(), store.clone(), failing_directory, channel.clone());
    let report = engine
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(report.counts.failed, 1);
    assert!(report.outcomes[0]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("Machine lookup failed"));
}

#[tokio::test]
async fn machine_without_technician_is_reported_not_dropped() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, None));
    store.insert_control(control(60, 1, now() + Duration::days(1), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(report.counts.failed, 1);
    assert!(report.outcomes[0].error_detail.as_deref().unwrap().contains("No recipients"));
    assert!(store.control(60).unwrap().last_notified_at.is_none());
}

#[tokio::test]
async fn overdue_controls_are_processed_before_upcoming() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(1, 1, now() + Duration::hours(5), ControlStatus::Pending));
    store.insert_control(control(2, 1, now() - Duration::days(1), ControlStatus::Pending));
    store.insert_control(control(3, 1, now() - Duration::days(3), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());
    let config = EngineConfig {
        escalate_on_overdue: false,
        ..config()
    };

    let report = engine(&store, &channel, config)
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    let order: Vec<i64> = report.outcomes.iter().map(|o| o.control_id).collect();
    assert_eq!(order, vec![3, 2, 1]);
}

#[tokio::test]
async fn second_run_skips_recently_notified_controls() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(70, 1, now() + Duration::days(2), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());
    let engine = engine(&store, &channel, config());

    engine
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();
    let second = engine
        .run_maintenance_notification_pass(Some(now() + Duration::hours(1)), RunTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(second.counts.upcoming_found, 1);
    assert_eq!(second.counts.skipped, 1);
    assert!(second.outcomes.is_empty());
    assert_eq!(channel.sent_to(TECH_A), 1);

    // Past the re-notification window the control is sent again.
    let third = engine
        .run_maintenance_notification_pass(Some(now() + Duration::hours(25)), RunTrigger::Scheduled)
        .await
        .unwrap();
    assert_eq!(third.counts.sent, 1);
    assert_eq!(channel.sent_to(TECH_A), 2);
}

#[tokio::test]
async fn failed_control_is_retried_on_next_run() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(80, 1, now() + Duration::days(1), ControlStatus::Pending));

    let failing = Arc::new(MockChannel::new().failing_for(TECH_A));
    let first = engine(&store, &failing, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();
    assert_eq!(first.counts.failed, 1);

    let healthy = Arc::new(MockChannel::new());
    let second = engine(&store, &healthy, config())
        .run_maintenance_notification_pass(Some(now() + Duration::minutes(10)), RunTrigger::Scheduled)
        .await
        .unwrap();
    assert_eq!(second.counts.sent, 1);
}

#[tokio::test]
async fn persistence_write_failure_still_counts_as_sent() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(90, 1, now() + Duration::days(1), ControlStatus::Pending));
    store.fail_writes(true);
    let channel = Arc::new(MockChannel::new());

    let report = engine(&store, &channel, config())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(report.counts.sent, 1);
    assert_eq!(report.counts.failed, 0);
    assert!(report.outcomes[0].warning.is_some());
}

#[tokio::test]
async fn scheduled_and_manual_runs_share_report_shape() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(100, 1, now() + Duration::days(1), ControlStatus::Pending));
    let config = config().with_renotify_interval(Duration::zero());
    let channel = Arc::new(MockChannel::new());
    let engine = engine(&store, &channel, config);

    let scheduled = engine
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();
    let manual = engine
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Manual)
        .await
        .unwrap();

    let a = serde_json::to_value(&scheduled).unwrap();
    let b = serde_json::to_value(&manual).unwrap();
    let keys = |v: &serde_json::Value| {
        let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        k.sort();
        k
    };
    assert_eq!(keys(&a), keys(&b));
    assert_eq!(a["counts"], b["counts"]);
    assert_eq!(a["trigger"], "scheduled");
    assert_eq!(b["trigger"], "manual");
}

#[tokio::test]
async fn upcoming_notice_does_not_suppress_overdue_escalation() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.insert_machine(machine(1, Some(TECH_A)));
    store.insert_control(control(110, 1, now() + Duration::hours(1), ControlStatus::Pending));
    let channel = Arc::new(MockChannel::new());
    let engine = engine(&store, &channel, config());

    let first = engine
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();
    assert_eq!(first.counts.upcoming_found, 1);
    assert_eq!(channel.sent_to(ADMIN_B), 0);

    // Two hours later the control is overdue, well inside the 24h window.
    let second = engine
        .run_maintenance_notification_pass(Some(now() + Duration::hours(2)), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(second.counts.overdue_found, 1);
    assert_eq!(second.counts.skipped, 0);
    assert_eq!(second.counts.sent, 2);
    assert_eq!(channel.sent_to(ADMIN_B), 1);
    assert_eq!(channel.sent_to(TECH_A), 2);

    // The overdue notice now counts; the next run inside the window skips it.
    let third = engine
        .run_maintenance_notification_pass(Some(now() + Duration::hours(3)), RunTrigger::Scheduled)
        .await
        .unwrap();
    assert_eq!(third.counts.skipped, 1);
    assert_eq!(channel.sent_to(ADMIN_B), 1);
}

/// Control source returning a fixed read, including undecodable records.
struct FixedSource(Vec<MaintenanceControl>, Vec<UnreadableControl>);

#[async_trait]
impl ControlSource for FixedSource {
    async fn list_pending_controls(&self) -> Result<PendingControls, StoreError> {
        Ok(PendingControls {
            controls: self.0.clone(),
            unreadable: self.1.clone(),
        })
    }

    async fn mark_notified(&self, _control_id: i64, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn unreadable_control_is_reported_as_failed_outcome() {
    let directory = Arc::new(InMemoryMaintenanceStore::new());
    directory.insert_machine(machine(1, Some(TECH_A)));
    let source = Arc::new(FixedSource(
        vec![control(120, 1, now() + Duration::days(1), ControlStatus::Pending)],
        vec![UnreadableControl {
            id: 121,
            detail: "bad timestamp '2026-13-45'".to_string(),
        }],
    ));
    let channel = Arc::new(MockChannel::new());

    let report = NotificationEngine::new(config(), source, directory, channel.clone())
        .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled)
        .await
        .unwrap();

    assert_eq!(report.counts.unreadable, 1);
    assert_eq!(report.counts.sent, 1);
    assert_eq!(report.counts.failed, 1);
    let failed = report.outcomes.iter().find(|o| o.control_id == 121).unwrap();
    assert!(!failed.success);
    assert!(failed.urgency.is_none());
    assert!(failed.recipient.is_none());
    assert!(failed.error_detail.as_deref().unwrap().contains("2026-13-45"));
}

#[tokio::test]
async fn coordinator_moves_from_idle_to_completed() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    let channel = Arc::new(MockChannel::new());
    let engine = engine(&store, &channel, config());

    let mut coordinator = engine.coordinator();
    assert_eq!(coordinator.state(), RunState::Idle);

    let report = coordinator.run(now(), RunTrigger::Manual).await.unwrap();
    assert_eq!(report.timestamp, now());
    assert_eq!(coordinator.state(), RunState::Completed);

    let again = coordinator.run(now(), RunTrigger::Manual).await;
    assert!(matches!(again, Err(EngineError::AlreadyRun)));
    assert_eq!(coordinator.state(), RunState::Completed);
}

#[tokio::test]
async fn aborted_run_still_completes_the_coordinator() {
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.fail_reads(true);
    let channel = Arc::new(MockChannel::new());
    let engine = engine(&store, &channel, config());

    let mut coordinator = engine.coordinator();
    assert!(coordinator.run(now(), RunTrigger::Scheduled).await.is_err());
    assert_eq!(coordinator.state(), RunState::Completed);
}

// =============================================================================
// PROPERTIES
// =============================================================================

fn status_strategy() -> impl Strategy<Value = ControlStatus> {
    prop_oneof![
        Just(ControlStatus::Pending),
        Just(ControlStatus::Completed),
        Just(ControlStatus::Cancelled),
    ]
}

fn control_strategy() -> impl Strategy<Value = MaintenanceControl> {
    (1i64..10_000, 1i64..4, -30 * 24i64..30 * 24, status_strategy()).prop_map(
        |(id, machine_id, offset_hours, status)| {
            control(id, machine_id, now() + Duration::hours(offset_hours), status)
        },
    )
}

proptest! {
    #[test]
    fn overdue_and_upcoming_follow_due_date_rules(
        controls in prop::collection::vec(control_strategy(), 0..40),
        horizon_hours in 0i64..(14 * 24),
    ) {
        let horizon = Duration::hours(horizon_hours);
        let result = classify(&controls, now(), horizon);

        for c in &result.overdue {
            prop_assert_eq!(c.status, ControlStatus::Pending);
            prop_assert!(c.due_date < now());
        }
        for c in &result.upcoming {
            prop_assert_eq!(c.status, ControlStatus::Pending);
            prop_assert!(c.due_date >= now() && c.due_date <= now() + horizon);
        }

        let expected_overdue = controls
            .iter()
            .filter(|c| c.is_pending() && c.due_date < now())
            .count();
        let expected_upcoming = controls
            .iter()
            .filter(|c| c.is_pending() && c.due_date >= now() && c.due_date <= now() + horizon)
            .count();
        prop_assert_eq!(result.overdue.len(), expected_overdue);
        prop_assert_eq!(result.upcoming.len(), expected_upcoming);
    }

    #[test]
    fn upcoming_and_overdue_are_disjoint(
        controls in prop::collection::vec(control_strategy(), 0..40),
        horizon_hours in -48i64..(14 * 24),
    ) {
        let controls: Vec<MaintenanceControl> = controls
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.id = i as i64;
                c
            })
            .collect();
        let result = classify(&controls, now(), Duration::hours(horizon_hours));

        for up in &result.upcoming {
            prop_assert!(result.overdue.iter().all(|o| o.id != up.id));
        }
        prop_assert!(result.upcoming.len() + result.overdue.len() <= controls.len());
    }

    #[test]
    fn sent_plus_failed_equals_attempts(
        offsets in prop::collection::vec(-10i64..10, 1..12),
        failing_admin in any::<bool>(),
        orphan_every in 2usize..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let store = Arc::new(InMemoryMaintenanceStore::new());
        store.insert_machine(machine(1, Some(TECH_A)));
        for (i, offset) in offsets.iter().enumerate() {
            let machine_id = if i % orphan_every == 0 { 404 } else { 1 };
            store.insert_control(control(
                i as i64 + 1,
                machine_id,
                now() + Duration::days(*offset),
                ControlStatus::Pending,
            ));
        }
        let channel = if failing_admin {
            Arc::new(MockChannel::new().failing_for(ADMIN_B))
        } else {
            Arc::new(MockChannel::new())
        };

        let report = runtime
            .block_on(
                engine(&store, &channel, config())
                    .run_maintenance_notification_pass(Some(now()), RunTrigger::Scheduled),
            )
            .unwrap();

        prop_assert_eq!(report.counts.sent + report.counts.failed, report.attempts());
        prop_assert_eq!(report.counts.sent, report.outcomes.iter().filter(|o| o.success).count());
        prop_assert_eq!(channel.sent().len(), report.counts.sent);
    }
}
