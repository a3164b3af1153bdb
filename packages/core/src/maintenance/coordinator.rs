//! Run Coordinator - orchestrates one classify → resolve → dispatch pass

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::maintenance::{
    classifier::classify,
    config::EngineConfig,
    dispatcher::NotificationDispatcher,
    error::{EngineError, ResolveError},
    provider::{ControlSource, MachineDirectory, NotificationChannel},
    resolver::StakeholderResolver,
    types::{MaintenanceControl, OutcomeEntry, RunReport, RunTrigger, Urgency},
};

/// Lifecycle of a single coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Drives exactly one run. Create a new coordinator for every pass.
///
/// The state is observable before and after [`RunCoordinator::run`]; once
/// `Completed`, further calls are rejected with [`EngineError::AlreadyRun`].
pub struct RunCoordinator<'a> {
    engine: &'a NotificationEngine,
    state: RunState,
}

impl<'a> RunCoordinator<'a> {
    fn new(engine: &'a NotificationEngine) -> Self {
        Self {
            engine,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run. Per-item failures land in the report; only a failure
    /// to read the control set is returned as an error. The coordinator ends
    /// in `Completed` either way.
    pub async fn run(
        &mut self,
        now: DateTime<Utc>,
        trigger: RunTrigger,
    ) -> Result<RunReport, EngineError> {
        if self.state != RunState::Idle {
            return Err(EngineError::AlreadyRun);
        }
        self.state = RunState::Running;
        let result = self.execute(now, trigger).await;
        self.state = RunState::Completed;
        result
    }

    async fn execute(&self, now: DateTime<Utc>, trigger: RunTrigger) -> Result<RunReport, EngineError> {
        let engine = self.engine;
        let config = &engine.config;

        let pending = engine
            .controls
            .list_pending_controls()
            .await
            .map_err(EngineError::ClassificationSource)?;

        let classified = classify(&pending.controls, now, config.horizon);

        let mut report = RunReport::new(now, trigger);
        report.counts.upcoming_found = classified.upcoming.len();
        report.counts.overdue_found = classified.overdue.len();
        report.counts.unreadable = pending.unreadable.len();

        tracing::info!(
            trigger = ?trigger,
            upcoming = report.counts.upcoming_found,
            overdue = report.counts.overdue_found,
            unreadable = report.counts.unreadable,
            "Maintenance notification run started"
        );

        for (control, urgency) in classified.in_processing_order() {
            if recently_notified(control, urgency, now, config.renotify_interval) {
                report.counts.skipped += 1;
                continue;
            }
            self.process_control(control, urgency, now, &mut report).await;
        }

        for unreadable in &pending.unreadable {
            tracing::warn!(control_id = unreadable.id, "Unreadable maintenance control: {}", unreadable.detail);
            report.record(OutcomeEntry {
                control_id: unreadable.id,
                urgency: None,
                recipient: None,
                success: false,
                message_id: None,
                error_detail: Some(format!("Unreadable control record: {}", unreadable.detail)),
                warning: None,
            });
        }

        tracing::info!(
            sent = report.counts.sent,
            failed = report.counts.failed,
            skipped = report.counts.skipped,
            "Maintenance notification run completed"
        );

        Ok(report)
    }

    async fn process_control(
        &self,
        control: &MaintenanceControl,
        urgency: Urgency,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let engine = self.engine;

        let lookup = engine
            .machines
            .get_machine(control.machine_id)
            .await
            .map_err(|source| ResolveError::Lookup {
                machine_id: control.machine_id,
                source,
            });

        let resolved = lookup.and_then(|machine| {
            engine
                .resolver
                .resolve_recipients(control, machine.as_ref(), urgency)
                .map(|recipients| (machine, recipients))
        });

        let (machine, recipients) = match resolved {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(control_id = control.id, "Recipient resolution failed: {}", err);
                report.record(failed_entry(control, urgency, err.to_string()));
                return;
            }
        };

        if recipients.is_empty() {
            tracing::warn!(control_id = control.id, "No recipients for control");
            report.record(failed_entry(
                control,
                urgency,
                format!("No recipients for machine {}", control.machine_id),
            ));
            return;
        }

        let outcomes = engine
            .dispatcher
            .dispatch(control, machine.as_ref(), urgency, &recipients, now)
            .await;

        for outcome in outcomes {
            report.record(OutcomeEntry {
                control_id: control.id,
                urgency: Some(urgency),
                recipient: Some(outcome.recipient.address),
                success: outcome.success,
                message_id: outcome.message_id,
                error_detail: outcome.error_detail,
                warning: outcome.warning,
            });
        }
    }
}

/// A notice sent before the due date went out as upcoming, so it never
/// suppresses the overdue escalation.
fn recently_notified(
    control: &MaintenanceControl,
    urgency: Urgency,
    now: DateTime<Utc>,
    interval: Duration,
) -> bool {
    if interval <= Duration::zero() {
        return false;
    }
    let Some(at) = control.last_notified_at else {
        return false;
    };
    if urgency == Urgency::Overdue && at < control.due_date {
        return false;
    }
    at <= now && now - at < interval
}

fn failed_entry(control: &MaintenanceControl, urgency: Urgency, detail: String) -> OutcomeEntry {
    OutcomeEntry {
        control_id: control.id,
        urgency: Some(urgency),
        recipient: None,
        success: false,
        message_id: None,
        error_detail: Some(detail),
        warning: None,
    }
}

/// Trigger surface shared by the timer loop and the HTTP handler.
///
/// Holds only collaborators and immutable settings; every call to
/// [`NotificationEngine::run_maintenance_notification_pass`] starts a fresh
/// [`RunCoordinator`].
pub struct NotificationEngine {
    config: EngineConfig,
    controls: Arc<dyn ControlSource + Send + Sync>,
    machines: Arc<dyn MachineDirectory + Send + Sync>,
    resolver: StakeholderResolver,
    dispatcher: NotificationDispatcher,
}

impl NotificationEngine {
    pub fn new(
        config: EngineConfig,
        controls: Arc<dyn ControlSource + Send + Sync>,
        machines: Arc<dyn MachineDirectory + Send + Sync>,
        channel: Arc<dyn NotificationChannel + Send + Sync>,
    ) -> Self {
        let resolver = StakeholderResolver::from_config(&config);
        let dispatcher = NotificationDispatcher::new(channel, controls.clone(), config.send_timeout);
        Self {
            config,
            controls,
            machines,
            resolver,
            dispatcher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> RunCoordinator<'_> {
        RunCoordinator::new(self)
    }

    /// Run one pass at `now` (defaults to the current time).
    pub async fn run_maintenance_notification_pass(
        &self,
        now: Option<DateTime<Utc>>,
        trigger: RunTrigger,
    ) -> Result<RunReport, EngineError> {
        let now = now.unwrap_or_else(Utc::now);
        self.coordinator().run(now, trigger).await
    }
}
