//! # Revision Client
//!
//! HTTP implementation of `RevisionTransport` against this service's own
//! `/api/update-payment-intent-amount` route. It is what a remote checkout
//! front end (kiosk, server-rendered page) plugs into `DebouncedReviser`.

use crate::auth::API_KEY_HEADER;
use crate::handlers::{UpdateAmountRequest, UpdateAmountResponse};
use async_trait::async_trait;
use checkout_core::{ChargeStatus, MethodKind, PaymentError, PaymentResult, Revision, RevisionTransport};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "checkout-api";

pub struct ApiRevisionTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiRevisionTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl RevisionTransport for ApiRevisionTransport {
    #[instrument(skip(self), fields(method = %method))]
    async fn revise(&self, charge_id: &str, method: MethodKind) -> PaymentResult<Revision> {
        let response = self
            .client
            .post(format!("{}/api/update-payment-intent-amount", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&UpdateAmountRequest {
                payment_intent_id: charge_id.to_string(),
                payment_method: method.as_str().to_string(),
            })
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(PaymentError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after_secs: retry_after,
                })
            }
            StatusCode::CONFLICT => {
                return Err(PaymentError::LockTimeout {
                    charge_id: charge_id.to_string(),
                })
            }
            s if !s.is_success() => {
                return Err(PaymentError::ProviderError {
                    provider: PROVIDER.to_string(),
                    message: format!("{}: {}", s, body),
                })
            }
            _ => {}
        }

        let parsed: UpdateAmountResponse = serde_json::from_str(&body)?;
        debug!(?parsed, "Revision response");

        let charge_status = ChargeStatus::parse(&parsed.status);
        Ok(match (parsed.amount, parsed.surcharge) {
            (Some(amount), Some(surcharge)) => Revision::Applied {
                amount,
                surcharge,
                status: charge_status,
            },
            _ => Revision::NotRevisable {
                status: charge_status,
            },
        })
    }
}
