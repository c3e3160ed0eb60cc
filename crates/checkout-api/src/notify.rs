//! # Order Notifiers
//!
//! `MailRelayNotifier` posts order notices to an HTTP mail relay: the
//! restaurant inbox is the recipient and the customer, when known, is
//! blind-copied. `LoggingNotifier` is the fallback when no relay is configured.

use async_trait::async_trait;
use checkout_core::{Notifier, OrderNotice, PaymentError, PaymentResult};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Where and as whom notices are sent
#[derive(Debug, Clone)]
pub struct MailRelayConfig {
    /// Relay endpoint accepting a JSON message
    pub url: String,
    /// Bearer token for the relay
    pub token: Option<String>,
    pub from: String,
    /// Restaurant inbox
    pub owner: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<&'a str>,
    subject: String,
    text: String,
}

pub struct MailRelayNotifier {
    config: MailRelayConfig,
    client: Client,
}

impl MailRelayNotifier {
    pub fn new(config: MailRelayConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    #[instrument(skip(self, notice), fields(charge_id = %notice.order.charge_id))]
    async fn notify(&self, notice: &OrderNotice) -> PaymentResult<()> {
        let message = RelayMessage {
            from: &self.config.from,
            to: &self.config.owner,
            bcc: notice.customer_email(),
            subject: notice.subject(),
            text: notice.summary(),
        };

        let mut request = self.client.post(&self.config.url).json(&message);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::NotificationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Mail relay error: {} | {}", status, body);
            return Err(PaymentError::NotificationFailed(format!(
                "mail relay returned {}",
                status
            )));
        }

        info!(subject = %message.subject, "Order notice sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mail-relay"
    }
}

/// Writes notices to the log instead of sending them
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notice: &OrderNotice) -> PaymentResult<()> {
        info!(
            subject = %notice.subject(),
            order_id = ?notice.order_id,
            customer = ?notice.customer_email(),
            "Order notice (not sent):\n{}",
            notice.summary()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
