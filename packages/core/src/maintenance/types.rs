//! Core data types for maintenance-control notification runs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of scheduled check a control represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Preventive,
    Calibration,
    SafetyInspection,
    Disinfection,
    ElectricalSafety,
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Preventive => "preventive",
            ControlType::Calibration => "calibration",
            ControlType::SafetyInspection => "safety_inspection",
            ControlType::Disinfection => "disinfection",
            ControlType::ElectricalSafety => "electrical_safety",
        }
    }

    /// Human-readable label used in notification subjects.
    pub fn label(&self) -> &'static str {
        match self {
            ControlType::Preventive => "Preventive maintenance",
            ControlType::Calibration => "Calibration",
            ControlType::SafetyInspection => "Safety inspection",
            ControlType::Disinfection => "Disinfection",
            ControlType::ElectricalSafety => "Electrical safety test",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preventive" => Ok(ControlType::Preventive),
            "calibration" => Ok(ControlType::Calibration),
            "safety_inspection" => Ok(ControlType::SafetyInspection),
            "disinfection" => Ok(ControlType::Disinfection),
            "electrical_safety" => Ok(ControlType::ElectricalSafety),
            other => Err(format!("unknown control type '{}'", other)),
        }
    }
}

/// Lifecycle state of a control. Only external workflows move it out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Pending => "pending",
            ControlStatus::Completed => "completed",
            ControlStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ControlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ControlStatus::Pending),
            "completed" => Ok(ControlStatus::Completed),
            "cancelled" => Ok(ControlStatus::Cancelled),
            other => Err(format!("unknown control status '{}'", other)),
        }
    }
}

/// A scheduled check for one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceControl {
    pub id: i64,
    pub machine_id: i64,
    pub control_type: ControlType,
    pub due_date: DateTime<Utc>,
    pub status: ControlStatus,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl MaintenanceControl {
    pub fn is_pending(&self) -> bool {
        self.status == ControlStatus::Pending
    }
}

/// A pending control whose stored record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableControl {
    pub id: i64,
    pub detail: String,
}

/// Everything a control source returned for one read.
#[derive(Debug, Clone, Default)]
pub struct PendingControls {
    pub controls: Vec<MaintenanceControl>,
    pub unreadable: Vec<UnreadableControl>,
}

impl From<Vec<MaintenanceControl>> for PendingControls {
    fn from(controls: Vec<MaintenanceControl>) -> Self {
        Self {
            controls,
            unreadable: Vec::new(),
        }
    }
}

/// Role a recipient plays for a given machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Technician,
    Admin,
}

/// Someone who can receive a maintenance notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub name: Option<String>,
    pub role: RecipientRole,
}

impl Recipient {
    pub fn technician(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            role: RecipientRole::Technician,
        }
    }

    pub fn admin(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            role: RecipientRole::Admin,
        }
    }

    /// Identity used for de-duplication: trimmed, lowercased address.
    pub fn identity(&self) -> String {
        self.address.trim().to_lowercase()
    }
}

impl PartialEq for Recipient {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Recipient {}

/// Equipment a control is scheduled against. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub technician: Option<Recipient>,
}

/// Why a control is being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Upcoming,
    Overdue,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Upcoming => "upcoming",
            Urgency::Overdue => "overdue",
        }
    }
}

/// Classifier output. The two sets never share a control.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifiedControls {
    pub upcoming: Vec<MaintenanceControl>,
    pub overdue: Vec<MaintenanceControl>,
}

impl ClassifiedControls {
    /// Overdue first, then upcoming, each in classifier order.
    pub fn in_processing_order(&self) -> impl Iterator<Item = (&MaintenanceControl, Urgency)> {
        self.overdue
            .iter()
            .map(|c| (c, Urgency::Overdue))
            .chain(self.upcoming.iter().map(|c| (c, Urgency::Upcoming)))
    }
}

/// A resolved (control, recipient) pair, alive only for one run.
#[derive(Debug, Clone)]
pub struct NotificationTarget<'a> {
    pub control: &'a MaintenanceControl,
    pub machine: Option<&'a Machine>,
    pub recipient: &'a Recipient,
    pub urgency: Urgency,
}

/// Result of one send attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub recipient: Recipient,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub upcoming_found: usize,
    pub overdue_found: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Pending controls the source could not decode. Each one also has a
    /// failed outcome.
    pub unreadable: usize,
}

/// One entry of a run report. `recipient` is `None` when the control failed
/// before any recipient could be resolved; `urgency` is `None` when the
/// control record itself was unreadable.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeEntry {
    pub control_id: i64,
    pub urgency: Option<Urgency>,
    pub recipient: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Aggregate result of one coordinator pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub trigger: RunTrigger,
    pub counts: RunCounts,
    pub outcomes: Vec<OutcomeEntry>,
}

impl RunReport {
    pub fn new(timestamp: DateTime<Utc>, trigger: RunTrigger) -> Self {
        Self {
            timestamp,
            trigger,
            counts: RunCounts::default(),
            outcomes: Vec::new(),
        }
    }

    /// Total notification attempts recorded, including resolution failures.
    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    pub(crate) fn record(&mut self, entry: OutcomeEntry) {
        if entry.success {
            self.counts.sent += 1;
        } else {
            self.counts.failed += 1;
        }
        self.outcomes.push(entry);
    }
}
