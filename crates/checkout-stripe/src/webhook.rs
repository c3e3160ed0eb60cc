//! # Stripe Webhook Handling
//!
//! Signature verification and event parsing for PaymentIntent webhooks.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the endpoint's
//! signing secret. The body must be verified byte-for-byte as received.

use crate::intents::StripePaymentIntent;
use checkout_core::{ChargeEvent, ChargeEventType, PaymentError, PaymentResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Events to enable on the Stripe endpoint
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] =
    &["payment_intent.succeeded", "payment_intent.payment_failed"];

/// Check the signature header against the raw payload.
///
/// `now` is a unix timestamp; the header timestamp must be within `tolerance_secs`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> PaymentResult<()> {
    let sig_parts = parse_signature_header(header)?;

    if (now - sig_parts.timestamp).abs() > tolerance_secs {
        return Err(PaymentError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let expected_sig = compute_signature(secret, sig_parts.timestamp, payload)?;
    let valid = sig_parts
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected_sig));

    if !valid {
        return Err(PaymentError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Parse a verified webhook body into a charge event
pub fn parse_event(payload: &[u8]) -> PaymentResult<ChargeEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        PaymentError::WebhookParseError(format!("Failed to parse webhook: {}", e))
    })?;

    debug!("Verified Stripe webhook: type={}", event.event_type);

    let event_type = match event.event_type.as_str() {
        "payment_intent.succeeded" => ChargeEventType::Succeeded,
        "payment_intent.payment_failed" => ChargeEventType::PaymentFailed,
        other => ChargeEventType::Other(other.to_string()),
    };

    // Only PaymentIntent objects become charges; other event objects are ignored
    let charge = match event.data.object.get("object").and_then(|v| v.as_str()) {
        Some("payment_intent") => {
            let intent: StripePaymentIntent =
                serde_json::from_value(serde_json::Value::Object(event.data.object))
                    .map_err(|e| {
                        PaymentError::WebhookParseError(format!(
                            "Malformed payment_intent object: {}",
                            e
                        ))
                    })?;
            Some(intent.into_charge())
        }
        _ => None,
    };

    Ok(ChargeEvent {
        event_id: event.id,
        event_type,
        charge,
        created: DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now),
    })
}

/// Build a `Stripe-Signature` header for a payload (Stripe CLI style, used by tests and tooling)
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)?
    ))
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, serde_json::Value>,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> PaymentResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        PaymentError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(PaymentError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::ChargeStatus;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn succeeded_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "created": 1_760_000_000,
            "data": {
                "object": {
                    "id": "pi_123",
                    "object": "payment_intent",
                    "amount": 1005,
                    "currency": "aud",
                    "status": "succeeded",
                    "client_secret": "pi_123_secret_abc",
                    "metadata": {
                        "name": "Linh",
                        "final_amount_cents": "1005"
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_signature_header() {
        let header = "t=1234567890,v1=abc123,v1=def456,v0=zzz";
        let parsed = parse_signature_header(header).unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures, vec!["abc123", "def456"]);
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=123").is_err());
    }

    #[test]
    fn test_valid_signature_verifies() {
        let payload = succeeded_payload();
        let header = signature_header(SECRET, 1_760_000_000, &payload).unwrap();
        assert!(verify_signature(&payload, &header, SECRET, 300, 1_760_000_100).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let payload = succeeded_payload();
        let header = signature_header(SECRET, 1_760_000_000, &payload).unwrap();
        let mut tampered = payload.clone();
        tampered.extend_from_slice(b" ");

        assert!(matches!(
            verify_signature(&tampered, &header, SECRET, 300, 1_760_000_000),
            Err(PaymentError::WebhookVerificationFailed(_))
        ));
        assert!(verify_signature(&payload, &header, "whsec_other", 300, 1_760_000_000).is_err());
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let payload = succeeded_payload();
        let header = signature_header(SECRET, 1_760_000_000, &payload).unwrap();
        assert!(verify_signature(&payload, &header, SECRET, 300, 1_760_000_301).is_err());
    }

    #[test]
    fn test_parse_payment_intent_event() {
        let event = parse_event(&succeeded_payload()).unwrap();

        assert_eq!(event.event_id, "evt_123");
        assert_eq!(event.event_type, ChargeEventType::Succeeded);
        let charge = event.charge.unwrap();
        assert_eq!(charge.id, "pi_123");
        assert_eq!(charge.amount, 1005);
        assert_eq!(charge.status, ChargeStatus::Succeeded);
        assert_eq!(charge.metadata.final_amount(), Some(1005));
    }

    #[test]
    fn test_other_events_have_no_charge() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_9",
            "type": "charge.refunded",
            "created": 1_760_000_000,
            "data": {"object": {"id": "ch_1", "object": "charge"}}
        }))
        .unwrap();

        let event = parse_event(&payload).unwrap();
        assert_eq!(
            event.event_type,
            ChargeEventType::Other("charge.refunded".to_string())
        );
        assert!(event.charge.is_none());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
