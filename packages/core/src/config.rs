use std::env;

use chrono::Duration;

use crate::cli::Cli;
use crate::maintenance::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub poll_interval_seconds: u64,
    pub horizon_days: i64,
    pub escalate_on_overdue: bool,
    pub admin_emails: Vec<String>,
    pub renotify_interval_hours: i64,
    pub send_timeout_seconds: u64,
    pub email: Option<EmailConfig>,
    pub api_port: u16,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub relay_url: String,
    pub from: String,
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

/// Reject day counts chrono cannot represent as a duration.
fn check_days(key: &str, days: i64) -> Result<i64, String> {
    if days < 0 {
        return Err(format!("{} must not be negative", key));
    }
    Duration::try_days(days)
        .map(|_| days)
        .ok_or_else(|| format!("{} out of range", key))
}

fn check_hours(key: &str, hours: i64) -> Result<i64, String> {
    if hours < 0 {
        return Err(format!("{} must not be negative", key));
    }
    Duration::try_hours(hours)
        .map(|_| hours)
        .ok_or_else(|| format!("{} out of range", key))
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, String> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some("false") | Some("0") | Some("no") => Ok(false),
        Some(other) => Err(format!("{} must be true or false, got '{}'", key, other)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://diacare.db".to_string());

        let poll_interval_seconds = parse_or(&lookup, "POLL_INTERVAL_SECONDS", 3600u64)?;
        if poll_interval_seconds == 0 {
            return Err("POLL_INTERVAL_SECONDS must be greater than zero".to_string());
        }

        let horizon_days = check_days("HORIZON_DAYS", parse_or(&lookup, "HORIZON_DAYS", 7i64)?)?;

        let escalate_on_overdue = parse_bool(&lookup, "ESCALATE_ON_OVERDUE", true)?;

        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let renotify_interval_hours = check_hours(
            "RENOTIFY_INTERVAL_HOURS",
            parse_or(&lookup, "RENOTIFY_INTERVAL_HOURS", 24i64)?,
        )?;
        let send_timeout_seconds = parse_or(&lookup, "SEND_TIMEOUT_SECONDS", 10u64)?;

        let email = lookup("EMAIL_RELAY_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|relay_url| EmailConfig {
                relay_url,
                from: lookup("EMAIL_FROM").unwrap_or_else(|| "diacare@localhost".to_string()),
            });

        let api_port = parse_or(&lookup, "API_PORT", 8080u16)?;

        Ok(Self {
            database_url,
            poll_interval_seconds,
            horizon_days,
            escalate_on_overdue,
            admin_emails,
            renotify_interval_hours,
            send_timeout_seconds,
            email,
            api_port,
        })
    }

    /// CLI flags take precedence over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(interval) = cli.poll_interval {
            self.poll_interval_seconds = interval.max(1);
        }
        if let Some(days) = cli.horizon_days {
            self.horizon_days = check_days("--horizon-days", days)?;
        }
        if let Some(port) = cli.port {
            self.api_port = port;
        }
        Ok(self)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            escalate_on_overdue: self.escalate_on_overdue,
            send_timeout: std::time::Duration::from_secs(self.send_timeout_seconds.max(1)),
            ..EngineConfig::default()
        }
        .with_horizon_days(self.horizon_days)
        .with_admins(self.admin_emails.iter().cloned())
        .with_renotify_interval(
            Duration::try_hours(self.renotify_interval_hours).unwrap_or(Duration::MAX),
        )
    }
}
