//! Stakeholder Resolver

use crate::maintenance::{
    config::EngineConfig,
    error::ResolveError,
    types::{Machine, MaintenanceControl, Recipient, Urgency},
};

/// Decides who hears about a control.
///
/// The assigned technician is always included. Overdue controls add the
/// configured administrators when escalation is enabled. The result never
/// holds two recipients with the same address.
#[derive(Debug, Clone)]
pub struct StakeholderResolver {
    escalate_on_overdue: bool,
    admins: Vec<Recipient>,
}

impl StakeholderResolver {
    pub fn new(escalate_on_overdue: bool, admins: Vec<Recipient>) -> Self {
        Self {
            escalate_on_overdue,
            admins,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.escalate_on_overdue, config.admin_recipients.clone())
    }

    /// Resolve recipients for `control`. `machine` is the result of the
    /// machine lookup; `None` means it could not be found.
    pub fn resolve_recipients(
        &self,
        control: &MaintenanceControl,
        machine: Option<&Machine>,
        urgency: Urgency,
    ) -> Result<Vec<Recipient>, ResolveError> {
        let machine = machine.ok_or(ResolveError::UnresolvedMachine {
            machine_id: control.machine_id,
        })?;

        let mut recipients: Vec<Recipient> = Vec::new();

        if let Some(technician) = &machine.technician {
            push_unique(&mut recipients, technician.clone());
        }

        if urgency == Urgency::Overdue && self.escalate_on_overdue {
            for admin in &self.admins {
                push_unique(&mut recipients, admin.clone());
            }
        }

        Ok(recipients)
    }
}

fn push_unique(recipients: &mut Vec<Recipient>, candidate: Recipient) {
    if candidate.identity().is_empty() {
        return;
    }
    if !recipients.contains(&candidate) {
        recipients.push(candidate);
    }
}
