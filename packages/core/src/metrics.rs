//! Prometheus metrics registry for the maintenance notification service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to
//! the scheduler and the API state.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, Gauge, Opts, Registry};

use crate::maintenance::RunReport;

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Completed notification runs (scheduled + manual).
    pub runs_total: Counter,
    /// Runs aborted because the control source could not be read.
    pub run_errors_total: Counter,
    /// Notifications accepted by the channel.
    pub notifications_sent_total: Counter,
    /// Failed notification attempts, including unresolved controls.
    pub notifications_failed_total: Counter,
    /// Overdue pending controls seen by the latest run.
    pub controls_overdue: Gauge,
    /// Upcoming pending controls seen by the latest run.
    pub controls_upcoming: Gauge,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = Counter::with_opts(Opts::new(
            "diacare_runs_total",
            "Completed maintenance notification runs",
        ))?;

        let run_errors_total = Counter::with_opts(Opts::new(
            "diacare_run_errors_total",
            "Notification runs aborted by a control source error",
        ))?;

        let notifications_sent_total = Counter::with_opts(Opts::new(
            "diacare_notifications_sent_total",
            "Maintenance notifications delivered to the channel",
        ))?;

        let notifications_failed_total = Counter::with_opts(Opts::new(
            "diacare_notifications_failed_total",
            "Failed maintenance notification attempts",
        ))?;

        let controls_overdue = Gauge::with_opts(Opts::new(
            "diacare_controls_overdue",
            "Overdue pending controls at the latest run",
        ))?;

        let controls_upcoming = Gauge::with_opts(Opts::new(
            "diacare_controls_upcoming",
            "Upcoming pending controls at the latest run",
        ))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(run_errors_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notifications_failed_total.clone()))?;
        registry.register(Box::new(controls_overdue.clone()))?;
        registry.register(Box::new(controls_upcoming.clone()))?;

        Ok(Self {
            runs_total,
            run_errors_total,
            notifications_sent_total,
            notifications_failed_total,
            controls_overdue,
            controls_upcoming,
            registry,
        })
    }

    /// Fold a finished run into the counters and gauges.
    pub fn observe_run(&self, report: &RunReport) {
        self.runs_total.inc();
        self.notifications_sent_total.inc_by(report.counts.sent as f64);
        self.notifications_failed_total.inc_by(report.counts.failed as f64);
        self.controls_overdue.set(report.counts.overdue_found as f64);
        self.controls_upcoming.set(report.counts.upcoming_found as f64);
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
