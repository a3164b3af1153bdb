//! Collaborator interfaces for the notification engine
//!
//! The engine never touches a database or mail transport directly. It talks
//! to these traits, which are implemented by the SQLite repository, the
//! in-memory store and the channels in [`crate::channels`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::maintenance::{
    error::{ChannelError, StoreError},
    types::{Machine, PendingControls, Recipient},
};

/// Source of maintenance controls, plus the single write the engine makes.
#[async_trait]
pub trait ControlSource {
    /// All controls whose status is still `Pending`. Records that exist but
    /// cannot be decoded are returned in `unreadable`, never dropped.
    async fn list_pending_controls(&self) -> Result<PendingControls, StoreError>;

    /// Stamp `last_notified_at` on a control. The stamp never moves
    /// backwards: an older `at` than the stored one leaves it unchanged.
    async fn mark_notified(&self, control_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Read-only machine lookup.
#[async_trait]
pub trait MachineDirectory {
    /// `Ok(None)` when the machine does not exist.
    async fn get_machine(&self, id: i64) -> Result<Option<Machine>, StoreError>;
}

/// Receipt returned by a channel after a successful send.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Outbound notification transport, treated as a black box.
#[async_trait]
pub trait NotificationChannel {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, ChannelError>;

    /// Name of this channel for logging.
    fn channel_name(&self) -> &str;
}
