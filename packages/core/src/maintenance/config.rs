//! Configuration for the notification engine

use chrono::Duration;

use crate::maintenance::types::Recipient;

/// Options the engine consumes on every run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far ahead a pending control counts as upcoming.
    pub horizon: Duration,
    /// Widen the audience to administrators for overdue controls.
    pub escalate_on_overdue: bool,
    /// Escalation recipients, in notification order.
    pub admin_recipients: Vec<Recipient>,
    /// Controls notified within this window are skipped. Zero disables.
    pub renotify_interval: Duration,
    /// Upper bound on a single send.
    pub send_timeout: std::time::Duration,
}

impl EngineConfig {
    /// Negative values mean zero; values beyond chrono's range saturate.
    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon = Duration::try_days(days.max(0)).unwrap_or(Duration::MAX);
        self
    }

    pub fn with_admins<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_recipients = addresses.into_iter().map(Recipient::admin).collect();
        self
    }

    pub fn with_renotify_interval(mut self, interval: Duration) -> Self {
        self.renotify_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::days(7),
            escalate_on_overdue: true,
            admin_recipients: Vec::new(),
            renotify_interval: Duration::hours(24),
            send_timeout: std::time::Duration::from_secs(10),
        }
    }
}
