//! Database repository for maintenance data.
//!
//! All SQLite read/write logic lives here. The notification engine reaches
//! the repository only through [`ControlSource`] and [`MachineDirectory`];
//! the scheduler and the on-demand API call
//! [`MaintenanceRepository::log_run_outcomes`] after each run so the outcome
//! history can be browsed at `/maintenance/notifications/history`.
//!
//! Timestamps are stored as RFC 3339 strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::maintenance::{
    error::StoreError,
    provider::{ControlSource, MachineDirectory},
    types::{
        ControlStatus, ControlType, Machine, MaintenanceControl, PendingControls, Recipient,
        RecipientRole, RunReport, UnreadableControl,
    },
};

/// A persisted run outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: i64,
    pub run_at: String,
    pub trigger: String,
    pub control_id: i64,
    pub urgency: String,
    pub recipient: Option<String>,
    pub success: bool,
    pub message_id: Option<String>,
    pub error_detail: Option<String>,
    pub warning: Option<String>,
}

/// Repository for reading and writing maintenance data to SQLite.
pub struct MaintenanceRepository {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::invalid_record(format!("bad timestamp '{}': {}", raw, err)))
}

fn role_str(role: RecipientRole) -> &'static str {
    match role {
        RecipientRole::Technician => "technician",
        RecipientRole::Admin => "admin",
    }
}

impl MaintenanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---- Users / machines ----

    /// Insert a user. Returns the new row id.
    pub async fn insert_user(
        &self,
        name: &str,
        email: &str,
        role: RecipientRole,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (name, email, role) VALUES (?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(role_str(role))
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert a machine. Returns the new row id.
    pub async fn insert_machine(
        &self,
        name: &str,
        location: Option<&str>,
        technician_id: Option<i64>,
    ) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO machines (name, location, technician_id) VALUES (?, ?, ?)")
                .bind(name)
                .bind(location)
                .bind(technician_id)
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    /// Hard-delete a machine. Its controls are left in place.
    /// Returns `true` if a row was deleted.
    pub async fn delete_machine(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM machines WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- Maintenance controls ----

    /// Schedule a new pending control. Returns the new row id.
    pub async fn insert_control(
        &self,
        machine_id: i64,
        control_type: ControlType,
        due_date: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO maintenance_controls (machine_id, control_type, due_date, status)
             VALUES (?, ?, ?, 'pending')",
        )
        .bind(machine_id)
        .bind(control_type.as_str())
        .bind(due_date.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Record a status change made by a maintenance workflow.
    /// Returns `true` if the control exists.
    pub async fn update_control_status(
        &self,
        id: i64,
        status: ControlStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE maintenance_controls SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch one control by id.
    pub async fn get_control(&self, id: i64) -> Result<Option<MaintenanceControl>, StoreError> {
        let row = sqlx::query(
            "SELECT id, machine_id, control_type, due_date, status, last_notified_at
             FROM maintenance_controls WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| control_from_row(&r)).transpose()
    }

    // ---- Notification history ----

    /// Persist every outcome of a run in a single transaction.
    pub async fn log_run_outcomes(&self, report: &RunReport) -> Result<(), sqlx::Error> {
        if report.outcomes.is_empty() {
            return Ok(());
        }

        let run_at = report.timestamp.to_rfc3339();
        let trigger = report.trigger.as_str();

        let mut tx = self.pool.begin().await?;

        for outcome in &report.outcomes {
            sqlx::query(
                "INSERT INTO notification_events
                 (run_at, run_trigger, control_id, urgency, recipient, success, message_id, error_detail, warning)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&run_at)
            .bind(trigger)
            .bind(outcome.control_id)
            .bind(outcome.urgency.map_or("unknown", |u| u.as_str()))
            .bind(&outcome.recipient)
            .bind(if outcome.success { 1i64 } else { 0i64 })
            .bind(&outcome.message_id)
            .bind(&outcome.error_detail)
            .bind(&outcome.warning)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Query notification history, newest first. `limit` is clamped to 1..=100.
    pub async fn query_notification_history(
        &self,
        limit: i64,
        success_filter: Option<bool>,
    ) -> Result<Vec<NotificationEvent>, sqlx::Error> {
        let limit = limit.clamp(1, 100);

        let sql = match success_filter {
            Some(_) => {
                "SELECT id, run_at, run_trigger, control_id, urgency, recipient, success, message_id, error_detail, warning
                 FROM notification_events
                 WHERE success = ?
                 ORDER BY run_at DESC, id DESC
                 LIMIT ?"
            }
            None => {
                "SELECT id, run_at, run_trigger, control_id, urgency, recipient, success, message_id, error_detail, warning
                 FROM notification_events
                 ORDER BY run_at DESC, id DESC
                 LIMIT ?"
            }
        };

        let mut q = sqlx::query(sql);
        if let Some(success) = success_filter {
            q = q.bind(if success { 1i64 } else { 0i64 });
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        let events = rows
            .into_iter()
            .filter_map(|row| {
                let success: i64 = row.try_get("success").ok()?;
                Some(NotificationEvent {
                    id: row.try_get("id").ok()?,
                    run_at: row.try_get("run_at").ok()?,
                    trigger: row.try_get("run_trigger").ok()?,
                    control_id: row.try_get("control_id").ok()?,
                    urgency: row.try_get("urgency").ok()?,
                    recipient: row.try_get("recipient").ok()?,
                    success: success != 0,
                    message_id: row.try_get("message_id").ok()?,
                    error_detail: row.try_get("error_detail").ok()?,
                    warning: row.try_get("warning").ok()?,
                })
            })
            .collect();

        Ok(events)
    }

    /// Count notification events (for pagination totals).
    pub async fn count_notification_events(
        &self,
        success_filter: Option<bool>,
    ) -> Result<i64, sqlx::Error> {
        let row = match success_filter {
            Some(success) => {
                sqlx::query("SELECT COUNT(*) AS cnt FROM notification_events WHERE success = ?")
                    .bind(if success { 1i64 } else { 0i64 })
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS cnt FROM notification_events")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(row.try_get("cnt").unwrap_or(0))
    }
}

fn control_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MaintenanceControl, StoreError> {
    let control_type: String = row.try_get("control_type")?;
    let status: String = row.try_get("status")?;
    let due_date: String = row.try_get("due_date")?;
    let last_notified_at: Option<String> = row.try_get("last_notified_at")?;

    Ok(MaintenanceControl {
        id: row.try_get("id")?,
        machine_id: row.try_get("machine_id")?,
        control_type: control_type.parse().map_err(StoreError::invalid_record)?,
        due_date: parse_timestamp(&due_date)?,
        status: status.parse().map_err(StoreError::invalid_record)?,
        last_notified_at: last_notified_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[async_trait]
impl ControlSource for MaintenanceRepository {
    async fn list_pending_controls(&self) -> Result<PendingControls, StoreError> {
        let rows = sqlx::query(
            "SELECT id, machine_id, control_type, due_date, status, last_notified_at
             FROM maintenance_controls
             WHERE status = 'pending'
             ORDER BY due_date ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pending = PendingControls::default();
        for row in &rows {
            match control_from_row(row) {
                Ok(control) => pending.controls.push(control),
                Err(err) => {
                    let id: i64 = row.try_get("id")?;
                    tracing::warn!(control_id = id, "Unreadable maintenance control: {}", err);
                    pending.unreadable.push(UnreadableControl {
                        id,
                        detail: err.to_string(),
                    });
                }
            }
        }

        Ok(pending)
    }

    async fn mark_notified(&self, control_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let stamp = at.to_rfc3339();
        let result = sqlx::query(
            "UPDATE maintenance_controls
             SET last_notified_at = ?, updated_at = datetime('now')
             WHERE id = ?
               AND (last_notified_at IS NULL
                    OR julianday(last_notified_at) IS NULL
                    OR julianday(last_notified_at) < julianday(?))",
        )
        .bind(&stamp)
        .bind(control_id)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing updated: either a newer stamp is already stored or the
        // control is gone.
        let exists = sqlx::query("SELECT 1 FROM maintenance_controls WHERE id = ?")
            .bind(control_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if !exists {
            return Err(StoreError::invalid_record(format!(
                "control {} does not exist",
                control_id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl MachineDirectory for MaintenanceRepository {
    async fn get_machine(&self, id: i64) -> Result<Option<Machine>, StoreError> {
        let row = sqlx::query(
            "SELECT m.id, m.name, m.location, u.name AS technician_name, u.email AS technician_email
             FROM machines m
             LEFT JOIN users u ON u.id = m.technician_id
             WHERE m.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let technician_email: Option<String> = row.try_get("technician_email")?;
        let technician_name: Option<String> = row.try_get("technician_name")?;

        Ok(Some(Machine {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            location: row.try_get("location")?,
            technician: technician_email.map(|email| Recipient::technician(email, technician_name)),
        }))
    }
}
