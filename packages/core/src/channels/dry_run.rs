use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::maintenance::{
    error::ChannelError,
    provider::{NotificationChannel, SendReceipt},
    types::Recipient,
};

/// Channel that logs every message instead of delivering it.
///
/// Used when no email relay is configured so the engine still runs and
/// stamps controls.
#[derive(Debug, Default)]
pub struct DryRunChannel {
    counter: AtomicU64,
}

impl DryRunChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationChannel for DryRunChannel {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, ChannelError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            to = %recipient.address,
            subject,
            body_len = body.len(),
            "[dry-run] notification #{}",
            n
        );
        Ok(SendReceipt {
            message_id: Some(format!("dry-run-{}", n)),
        })
    }

    fn channel_name(&self) -> &str {
        "dry-run"
    }
}
