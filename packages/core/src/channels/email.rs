//! HTTP email relay delivery.
//!
//! Posts each notification as JSON to a transactional-mail relay:
//!
//! ```json
//! { "from": "...", "to": "...", "subject": "...", "text": "..." }
//! ```
//!
//! Any 2xx response is a successful send. If the relay answers with a JSON
//! object carrying an `id` field it is kept as the message id. Bounces and
//! relay-side retries are the relay's concern.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::maintenance::{
    error::ChannelError,
    provider::{NotificationChannel, SendReceipt},
    types::Recipient,
};

#[derive(Clone)]
pub struct EmailRelayChannel {
    relay_url: String,
    from: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    id: Option<String>,
}

impl EmailRelayChannel {
    pub fn new(relay_url: String, from: String) -> Self {
        Self {
            relay_url,
            from,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailRelayChannel {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, ChannelError> {
        let request = RelayRequest {
            from: &self.from,
            to: recipient.address.trim(),
            subject,
            text: body,
        };

        let response = self
            .http
            .post(&self.relay_url)
            .json(&request)
            .send()
            .await
            .map_err(|err| ChannelError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
            });
        }

        // A relay that returns an empty or non-JSON body still delivered the mail.
        let message_id = response
            .json::<RelayResponse>()
            .await
            .ok()
            .and_then(|r| r.id);

        Ok(SendReceipt { message_id })
    }

    fn channel_name(&self) -> &str {
        "email-relay"
    }
}
