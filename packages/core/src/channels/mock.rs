//! Scriptable in-process channel for tests and local experiments.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::maintenance::{
    error::ChannelError,
    provider::{NotificationChannel, SendReceipt},
    types::Recipient,
};

/// A message the mock accepted.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every successful send. Addresses registered with
/// [`MockChannel::failing_for`] are rejected with a network error.
#[derive(Debug, Default)]
pub struct MockChannel {
    failing: HashSet<String>,
    delay: Option<Duration>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.trim().to_lowercase());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_to(&self, address: &str) -> usize {
        self.sent().iter().filter(|m| m.to == address).count()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, ChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&recipient.identity()) {
            return Err(ChannelError::network(format!(
                "mailbox {} unavailable",
                recipient.address
            )));
        }

        let mut sent = self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.push(SentMessage {
            to: recipient.address.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        });

        Ok(SendReceipt {
            message_id: Some(format!("mock-{}", sent.len())),
        })
    }

    fn channel_name(&self) -> &str {
        "mock"
    }
}
