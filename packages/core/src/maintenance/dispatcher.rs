//! Notification Dispatcher
//!
//! Sends one message per recipient of a control and reports every attempt.
//! Sends are independent: a failure is recorded and the next recipient is
//! still attempted. Nothing is retried here; a control that got no successful
//! send is still pending and is picked up again by the next run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::maintenance::{
    error::ChannelError,
    provider::{ControlSource, NotificationChannel, SendReceipt},
    types::{DispatchOutcome, Machine, MaintenanceControl, NotificationTarget, Recipient, Urgency},
};

/// Subject and body for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub body: String,
}

pub struct NotificationDispatcher {
    channel: Arc<dyn NotificationChannel + Send + Sync>,
    controls: Arc<dyn ControlSource + Send + Sync>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        channel: Arc<dyn NotificationChannel + Send + Sync>,
        controls: Arc<dyn ControlSource + Send + Sync>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            controls,
            send_timeout,
        }
    }

    /// Attempt every recipient of `control` and return one outcome per
    /// recipient, in recipient order.
    ///
    /// When at least one send succeeds the control is stamped with `run_at`.
    /// A failed stamp is attached as a warning to the successful outcomes;
    /// those sends still count as delivered.
    pub async fn dispatch(
        &self,
        control: &MaintenanceControl,
        machine: Option<&Machine>,
        urgency: Urgency,
        recipients: &[Recipient],
        run_at: DateTime<Utc>,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let target = NotificationTarget {
                control,
                machine,
                recipient,
                urgency,
            };
            let message = compose_message(&target, run_at);

            let outcome = match self.send_bounded(recipient, &message).await {
                Ok(receipt) => {
                    tracing::debug!(
                        control_id = control.id,
                        recipient = %recipient.address,
                        channel = self.channel.channel_name(),
                        "Notification sent"
                    );
                    DispatchOutcome {
                        recipient: recipient.clone(),
                        success: true,
                        message_id: receipt.message_id,
                        error_detail: None,
                        warning: None,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        control_id = control.id,
                        recipient = %recipient.address,
                        "Notification send failed: {}",
                        err
                    );
                    DispatchOutcome {
                        recipient: recipient.clone(),
                        success: false,
                        message_id: None,
                        error_detail: Some(err.to_string()),
                        warning: None,
                    }
                }
            };

            outcomes.push(outcome);
        }

        if outcomes.iter().any(|o| o.success) {
            if let Err(err) = self.controls.mark_notified(control.id, run_at).await {
                let warning = format!("Failed to record notification time: {}", err);
                tracing::warn!(control_id = control.id, "{}", warning);
                for outcome in outcomes.iter_mut().filter(|o| o.success) {
                    outcome.warning = Some(warning.clone());
                }
            }
        }

        outcomes
    }

    async fn send_bounded(
        &self,
        recipient: &Recipient,
        message: &ComposedMessage,
    ) -> Result<SendReceipt, ChannelError> {
        match tokio::time::timeout(
            self.send_timeout,
            self.channel.send(recipient, &message.subject, &message.body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                seconds: self.send_timeout.as_secs(),
            }),
        }
    }
}

/// Render the subject and body for one (control, recipient) pair.
pub fn compose_message(target: &NotificationTarget<'_>, run_at: DateTime<Utc>) -> ComposedMessage {
    let control = target.control;
    let machine_label = match target.machine {
        Some(machine) => format!("{} (#{})", machine.name, machine.id),
        None => format!("machine #{}", control.machine_id),
    };

    let subject = match target.urgency {
        Urgency::Overdue => format!(
            "[OVERDUE] {} for {}",
            control.control_type.label(),
            machine_label
        ),
        Urgency::Upcoming => format!(
            "[Upcoming] {} for {}",
            control.control_type.label(),
            machine_label
        ),
    };

    let days = (control.due_date - run_at).num_days();
    let timing = match target.urgency {
        Urgency::Overdue if days == 0 => "It became overdue less than a day ago.".to_string(),
        Urgency::Overdue => format!("It is {} day(s) overdue.", -days),
        Urgency::Upcoming if days == 0 => "It is due within the next day.".to_string(),
        Urgency::Upcoming => format!("It is due in {} day(s).", days),
    };

    let greeting = match &target.recipient.name {
        Some(name) => format!("Hello {},", name),
        None => "Hello,".to_string(),
    };

    let mut body = format!(
        "{}\n\n{} (control #{}) for {} is {}.\nDue date: {}\n{}\n",
        greeting,
        control.control_type.label(),
        control.id,
        machine_label,
        target.urgency.as_str(),
        control.due_date.format("%Y-%m-%d %H:%M UTC"),
        timing,
    );

    if let Some(location) = target.machine.and_then(|m| m.location.as_deref()) {
        body.push_str(&format!("Location: {}\n", location));
    }

    body.push_str("\nPlease record the intervention in DiaCare once completed.\n");

    ComposedMessage { subject, body }
}
