//! Maintenance notification scheduler.
//!
//! Drives the timer loop: each tick runs one notification pass, records
//! the outcomes in the notification history, and folds the report into the
//! metrics. The on-demand API endpoint goes through [`execute_run`] too, so
//! both paths log, persist and count runs identically.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time;

use crate::maintenance::{EngineError, NotificationEngine, RunReport, RunTrigger};
use crate::metrics::AppMetrics;
use crate::repository::MaintenanceRepository;

/// Run one pass and record it.
///
/// A failure to persist the outcome history is logged; the report is still
/// returned because the notifications were already sent.
pub async fn execute_run(
    engine: &NotificationEngine,
    history: &MaintenanceRepository,
    metrics: &AppMetrics,
    trigger: RunTrigger,
    now: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<RunReport, EngineError> {
    let report = match engine.run_maintenance_notification_pass(now, trigger).await {
        Ok(report) => report,
        Err(err) => {
            metrics.run_errors_total.inc();
            tracing::error!("Maintenance notification run aborted: {}", err);
            return Err(err);
        }
    };

    metrics.observe_run(&report);

    if let Err(err) = history.log_run_outcomes(&report).await {
        tracing::error!("Failed to record notification history: {}", err);
    }

    if report.counts.failed > 0 {
        tracing::warn!(
            "Run finished with {} failed notification(s) out of {}",
            report.counts.failed,
            report.attempts()
        );
    }

    Ok(report)
}

/// Run the notification loop.
///
/// The first pass happens immediately, then every `interval_seconds`. Errors
/// are logged and the loop continues; a source outage is retried on the next
/// tick.
///
/// Runs until `Ctrl+C` (SIGINT) is received.
pub async fn run_notification_loop(
    engine: Arc<NotificationEngine>,
    history: Arc<MaintenanceRepository>,
    metrics: Arc<AppMetrics>,
    interval_seconds: u64,
) {
    let mut interval = time::interval(Duration::from_secs(interval_seconds.max(1)));

    tracing::info!(
        "Maintenance notification scheduler started (interval: {}s)",
        interval_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _ = execute_run(&engine, &history, &metrics, RunTrigger::Scheduled, None).await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping scheduler.");
                break;
            }
        }
    }

    tracing::info!("Maintenance notification scheduler stopped cleanly");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::channels::mock::MockChannel;
    use crate::db::create_pool;
    use crate::maintenance::EngineConfig;
    use crate::store::InMemoryMaintenanceStore;

    async fn setup(
        store: Arc<InMemoryMaintenanceStore>,
    ) -> (NotificationEngine, MaintenanceRepository, AppMetrics) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let engine = NotificationEngine::new(
            EngineConfig::default().with_admins(["admin@diacare.test"]),
            store.clone(),
            store,
            Arc::new(MockChannel::new()),
        );
        (engine, MaintenanceRepository::new(pool), AppMetrics::new().unwrap())
    }

    #[tokio::test]
    async fn execute_run_records_history_and_metrics() {
        let store = Arc::new(InMemoryMaintenanceStore::with_demo_data(Utc::now()));
        let (engine, history, metrics) = setup(store).await;

        let report = execute_run(&engine, &history, &metrics, RunTrigger::Scheduled, None)
            .await
            .unwrap();

        assert!(report.attempts() > 0);
        let logged = history.count_notification_events(None).await.unwrap();
        assert_eq!(logged as usize, report.attempts());
        assert!((metrics.runs_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn execute_run_on_source_error_counts_run_error() {
        let store = Arc::new(InMemoryMaintenanceStore::new());
        store.fail_reads(true);
        let (engine, history, metrics) = setup(store).await;

        let result = execute_run(&engine, &history, &metrics, RunTrigger::Manual, None).await;

        assert!(result.is_err());
        assert!((metrics.run_errors_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.runs_total.get()).abs() < f64::EPSILON);
        assert_eq!(history.count_notification_events(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn two_runs_within_renotify_window_send_once() {
        let now = Utc::now();
        let store = Arc::new(InMemoryMaintenanceStore::with_demo_data(now));
        let (engine, history, metrics) = setup(store).await;

        let first = execute_run(&engine, &history, &metrics, RunTrigger::Scheduled, Some(now))
            .await
            .unwrap();
        let second = execute_run(
            &engine,
            &history,
            &metrics,
            RunTrigger::Scheduled,
            Some(now + ChronoDuration::minutes(5)),
        )
        .await
        .unwrap();

        assert!(first.counts.sent > 0);
        assert_eq!(second.counts.sent, 0);
    }
}
