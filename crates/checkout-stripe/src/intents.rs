//! # Stripe PaymentIntents
//!
//! `ChargeProcessor` implementation over the Stripe PaymentIntents API.
//! Requests are form-encoded; metadata travels as `metadata[key]=value`.

use crate::config::StripeConfig;
use crate::webhook;
use async_trait::async_trait;
use checkout_core::{
    Charge, ChargeEvent, ChargeMetadata, ChargeProcessor, ChargeStatus, ChargeUpdate, NewCharge,
    PaymentError, PaymentResult,
};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Stripe PaymentIntents processor
pub struct StripeChargeProcessor {
    config: StripeConfig,
    client: Client,
}

impl StripeChargeProcessor {
    /// Create a new processor
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    fn intent_url(&self, charge_id: Option<&str>) -> String {
        match charge_id {
            Some(id) => format!("{}/v1/payment_intents/{}", self.config.api_base_url, id),
            None => format!("{}/v1/payment_intents", self.config.api_base_url),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
    }

    async fn send(&self, request: RequestBuilder, charge_id: Option<&str>) -> PaymentResult<Charge> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);
            return Err(map_stripe_error(status, &body, retry_after, charge_id));
        }

        let intent: StripePaymentIntent = serde_json::from_str(&body).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })?;
        Ok(intent.into_charge())
    }
}

fn metadata_params(params: &mut Vec<(String, String)>, metadata: &ChargeMetadata) {
    for (key, value) in metadata.iter() {
        params.push((format!("metadata[{}]", key), value.clone()));
    }
}

#[async_trait]
impl ChargeProcessor for StripeChargeProcessor {
    #[instrument(skip(self, charge), fields(amount = charge.amount))]
    async fn create_charge(&self, charge: NewCharge) -> PaymentResult<Charge> {
        let mut form_params: Vec<(String, String)> = vec![
            ("amount".to_string(), charge.amount.to_string()),
            ("currency".to_string(), charge.currency.as_str().to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(ref email) = charge.receipt_email {
            form_params.push(("receipt_email".to_string(), email.clone()));
        }
        metadata_params(&mut form_params, &charge.metadata);

        let request = self
            .client
            .post(self.intent_url(None))
            .header("Idempotency-Key", &charge.idempotency_key)
            .form(&form_params);

        let created = self.send(request, None).await?;
        info!(
            "Created Stripe payment intent: id={}, amount={}",
            created.id, created.amount
        );
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn retrieve_charge(&self, charge_id: &str) -> PaymentResult<Charge> {
        let request = self.client.get(self.intent_url(Some(charge_id)));
        self.send(request, Some(charge_id)).await
    }

    #[instrument(skip(self, update), fields(amount = update.amount))]
    async fn update_charge(&self, charge_id: &str, update: ChargeUpdate) -> PaymentResult<Charge> {
        let mut form_params = vec![("amount".to_string(), update.amount.to_string())];
        metadata_params(&mut form_params, &update.metadata);

        let request = self
            .client
            .post(self.intent_url(Some(charge_id)))
            .form(&form_params);

        let updated = self.send(request, Some(charge_id)).await?;
        debug!("Updated Stripe payment intent: id={}", updated.id);
        Ok(updated)
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> PaymentResult<ChargeEvent> {
        webhook::verify_signature(
            payload,
            signature,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )?;
        webhook::parse_event(payload)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Translate a Stripe error response into the checkout taxonomy
fn map_stripe_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<u64>,
    charge_id: Option<&str>,
) -> PaymentError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return PaymentError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after_secs: retry_after.unwrap_or(1),
        };
    }

    let Ok(parsed) = serde_json::from_str::<StripeErrorResponse>(body) else {
        return PaymentError::ProviderError {
            provider: PROVIDER.to_string(),
            message: format!("HTTP {}: {}", status, body),
        };
    };
    let err = parsed.error;

    match err.code.as_deref() {
        Some("lock_timeout") => PaymentError::LockTimeout {
            charge_id: charge_id.unwrap_or_default().to_string(),
        },
        Some("payment_intent_unexpected_state") => PaymentError::ChargeNotRevisable {
            status: err
                .payment_intent
                .and_then(|pi| pi.status)
                .unwrap_or_else(|| ChargeStatus::Unknown.as_str().to_string()),
        },
        // Older API versions only say so in the message
        _ if err.message.contains("status of processing") => PaymentError::ChargeNotRevisable {
            status: ChargeStatus::Processing.as_str().to_string(),
        },
        _ => PaymentError::ProviderError {
            provider: PROVIDER.to_string(),
            message: err.message,
        },
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

/// PaymentIntent object as returned by the API and embedded in events
#[derive(Debug, Deserialize)]
pub(crate) struct StripePaymentIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl StripePaymentIntent {
    pub(crate) fn into_charge(self) -> Charge {
        Charge {
            id: self.id,
            client_secret: self.client_secret,
            amount: self.amount,
            currency: self.currency,
            status: ChargeStatus::parse(&self.status),
            metadata: ChargeMetadata::from_map(self.metadata),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    payment_intent: Option<StripeErrorIntent>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorIntent {
    #[serde(default)]
    status: Option<String>,
}
