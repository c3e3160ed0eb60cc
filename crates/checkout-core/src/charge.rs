//! # Charge Types
//!
//! The processor-owned charge and the metadata bag this system uses as its
//! only store for in-flight order context. Everything needed to rebuild the
//! order when the charge settles must live in [`ChargeMetadata`].

use crate::error::{PaymentError, PaymentResult};
use crate::money::Currency;
use crate::order::{NewOrder, OrderItem, PaymentStatus, PickupKind};
use crate::surcharge::{MethodKind, SurchargeQuote, SurchargeRates};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata keys written on the charge
pub mod keys {
    pub const NAME: &str = "name";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const SUMMARY: &str = "summary";
    pub const BASE_AMOUNT_CENTS: &str = "base_amount_cents";
    pub const BASE_AMOUNT_DOLLARS: &str = "base_amount_dollars";
    pub const PICKUP_TYPE: &str = "pickup_type";
    pub const DATETIME: &str = "datetime";
    pub const NOTE: &str = "note";
    pub const ITEMS_DATA: &str = "items_data";
    pub const FINAL_PAYMENT_METHOD: &str = "final_payment_method";
    pub const FINAL_AMOUNT_CENTS: &str = "final_amount_cents";
    pub const FINAL_SURCHARGE_CENTS: &str = "final_surcharge_cents";
}

/// Longest value the processor accepts for one metadata key
pub const MAX_METADATA_VALUE_LEN: usize = 500;

/// Upper bound on `items_data_N` keys (the processor allows 50 keys in total)
pub const MAX_ITEM_CHUNKS: usize = 40;

const CHUNK_MARKER: &str = "chunks:";
const UNSPECIFIED_DATETIME: &str = "Not specified";

/// Charge lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    PaymentFailed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl ChargeStatus {
    /// Only these states accept an amount change
    pub fn is_revisable(&self) -> bool {
        matches!(
            self,
            ChargeStatus::RequiresPaymentMethod
                | ChargeStatus::RequiresConfirmation
                | ChargeStatus::RequiresAction
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChargeStatus::Succeeded | ChargeStatus::PaymentFailed | ChargeStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::RequiresPaymentMethod => "requires_payment_method",
            ChargeStatus::RequiresConfirmation => "requires_confirmation",
            ChargeStatus::RequiresAction => "requires_action",
            ChargeStatus::Processing => "processing",
            ChargeStatus::RequiresCapture => "requires_capture",
            ChargeStatus::Succeeded => "succeeded",
            ChargeStatus::PaymentFailed => "payment_failed",
            ChargeStatus::Canceled => "canceled",
            ChargeStatus::Unknown => "unknown",
        }
    }

    /// Parse a processor status string; unrecognised values map to `Unknown`
    pub fn parse(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_string()))
            .unwrap_or(ChargeStatus::Unknown)
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String key/value bag stored on the charge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeMetadata(BTreeMap<String, String>);

impl ChargeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    /// Metadata for a provisional charge: customer context, the base amount and
    /// every method's precomputed surcharge/total.
    pub fn provisional(
        details: ProvisionalContext<'_>,
        items: &[OrderItem],
        base_amount: i64,
        currency: Currency,
        rates: &SurchargeRates,
    ) -> PaymentResult<Self> {
        let mut meta = Self::new();
        meta.insert(keys::NAME, details.name.trim());
        meta.insert(keys::PHONE, details.phone.trim());
        if let Some(email) = details.email {
            meta.insert(keys::EMAIL, email);
        }
        meta.insert(keys::SUMMARY, format!("Items: {}", items.len()));
        meta.insert(keys::BASE_AMOUNT_CENTS, base_amount.to_string());
        meta.insert(keys::BASE_AMOUNT_DOLLARS, currency.format_plain(base_amount));
        for kind in MethodKind::ALL {
            let quote = SurchargeQuote::new(rates, base_amount, kind);
            meta.insert(
                format!("total_with_{}_surcharge", kind.as_str()),
                quote.total.to_string(),
            );
            meta.insert(
                format!("{}_surcharge_cents", kind.as_str()),
                quote.surcharge.to_string(),
            );
        }
        meta.insert(keys::PICKUP_TYPE, details.pickup.as_str());
        let datetime = details.datetime.trim();
        meta.insert(
            keys::DATETIME,
            if datetime.is_empty() {
                UNSPECIFIED_DATETIME
            } else {
                datetime
            },
        );
        if let Some(note) = details.note.map(str::trim).filter(|n| !n.is_empty()) {
            meta.insert(keys::NOTE, note);
        }
        meta.set_items(items)?;
        Ok(meta)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Record the chosen method. All three `final_*` keys are always written together.
    pub fn set_final_revision(&mut self, quote: &SurchargeQuote) {
        self.insert(keys::FINAL_PAYMENT_METHOD, quote.method.as_str());
        self.insert(keys::FINAL_AMOUNT_CENTS, quote.total.to_string());
        self.insert(keys::FINAL_SURCHARGE_CENTS, quote.surcharge.to_string());
    }

    fn parse_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn base_amount(&self) -> Option<i64> {
        self.parse_i64(keys::BASE_AMOUNT_CENTS)
    }

    pub fn final_amount(&self) -> Option<i64> {
        self.parse_i64(keys::FINAL_AMOUNT_CENTS)
    }

    pub fn final_surcharge(&self) -> Option<i64> {
        self.parse_i64(keys::FINAL_SURCHARGE_CENTS)
    }

    pub fn final_method(&self) -> Option<MethodKind> {
        self.get(keys::FINAL_PAYMENT_METHOD)
            .and_then(|v| v.parse().ok())
    }

    /// Customer email, ignoring blanks
    pub fn customer_email(&self) -> Option<&str> {
        self.get(keys::EMAIL).map(str::trim).filter(|e| !e.is_empty())
    }

    /// Store the item list, split across `items_data_N` when it is too long for one key
    pub fn set_items(&mut self, items: &[OrderItem]) -> PaymentResult<()> {
        let encoded = serde_json::to_string(items)?;
        let chars: Vec<char> = encoded.chars().collect();
        if chars.len() <= MAX_METADATA_VALUE_LEN {
            self.insert(keys::ITEMS_DATA, encoded);
            return Ok(());
        }

        let chunks: Vec<String> = chars
            .chunks(MAX_METADATA_VALUE_LEN)
            .map(|c| c.iter().collect())
            .collect();
        if chunks.len() > MAX_ITEM_CHUNKS {
            return Err(PaymentError::Validation(
                "Order has too many items to record on the charge".to_string(),
            ));
        }
        self.insert(keys::ITEMS_DATA, format!("{}{}", CHUNK_MARKER, chunks.len()));
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.insert(format!("{}_{}", keys::ITEMS_DATA, i), chunk);
        }
        Ok(())
    }

    /// Item list, reassembled from chunks when needed. `None` when absent.
    pub fn items(&self) -> PaymentResult<Option<Vec<OrderItem>>> {
        let Some(raw) = self.get(keys::ITEMS_DATA) else {
            return Ok(None);
        };

        let encoded = match raw.strip_prefix(CHUNK_MARKER) {
            Some(count) => {
                let count: usize = count.parse().map_err(|_| {
                    PaymentError::Serialization(format!("Bad items_data chunk count: {}", raw))
                })?;
                let mut joined = String::new();
                for i in 0..count {
                    let key = format!("{}_{}", keys::ITEMS_DATA, i);
                    let part = self.get(&key).ok_or_else(|| {
                        PaymentError::Serialization(format!("Missing metadata chunk {}", key))
                    })?;
                    joined.push_str(part);
                }
                joined
            }
            None => raw.to_string(),
        };

        Ok(Some(serde_json::from_str(&encoded)?))
    }
}

/// Customer/pickup fields copied onto a provisional charge
#[derive(Debug, Clone, Copy)]
pub struct ProvisionalContext<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: Option<&'a str>,
    pub note: Option<&'a str>,
    pub pickup: PickupKind,
    pub datetime: &'a str,
}

/// A charge as reported by the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Secret handed to the browser to confirm the payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    pub status: ChargeStatus,
    #[serde(default)]
    pub metadata: ChargeMetadata,
}

impl Charge {
    /// Rebuild the order from metadata. `Ok(None)` when the charge does not
    /// carry the minimum context (`name` and `items_data`).
    pub fn order_draft(
        &self,
        status: PaymentStatus,
    ) -> PaymentResult<Option<(NewOrder, Vec<OrderItem>)>> {
        let meta = &self.metadata;
        let name = meta.get(keys::NAME).map(str::trim).filter(|n| !n.is_empty());
        let (Some(name), true) = (name, meta.contains_key(keys::ITEMS_DATA)) else {
            return Ok(None);
        };
        let items = meta.items()?.unwrap_or_default();

        let total = meta.final_amount().unwrap_or(self.amount);
        let subtotal = match meta.base_amount() {
            Some(amount) => amount,
            None => OrderItem::total_of(&items).ok_or_else(|| {
                PaymentError::Serialization("items_data totals out of range".to_string())
            })?,
        };

        let order = NewOrder {
            name: name.to_string(),
            phone: meta.get(keys::PHONE).unwrap_or_default().to_string(),
            email: meta.customer_email().map(String::from),
            note: meta.get(keys::NOTE).map(String::from),
            pickup_type: meta
                .get(keys::PICKUP_TYPE)
                .and_then(PickupKind::parse)
                .unwrap_or_default(),
            datetime: meta
                .get(keys::DATETIME)
                .unwrap_or(UNSPECIFIED_DATETIME)
                .to_string(),
            subtotal,
            total,
            surcharge_amount: meta.final_surcharge().unwrap_or(0),
            payment_method: meta.final_method().unwrap_or(MethodKind::Card),
            charge_id: self.id.clone(),
            payment_status: status,
        };
        Ok(Some((order, items)))
    }
}

/// Parameters for opening a charge
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub amount: i64,
    pub currency: Currency,
    pub receipt_email: Option<String>,
    pub metadata: ChargeMetadata,
    /// Sent as the processor idempotency key
    pub idempotency_key: String,
}

/// Amount and metadata written when revising a charge
#[derive(Debug, Clone)]
pub struct ChargeUpdate {
    pub amount: i64,
    pub metadata: ChargeMetadata,
}

/// Event types the reconciler acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeEventType {
    /// Charge settled successfully
    Succeeded,
    /// Charge attempt failed
    PaymentFailed,
    /// Anything else (acknowledged and ignored)
    Other(String),
}

/// A verified, parsed processor event
#[derive(Debug, Clone)]
pub struct ChargeEvent {
    pub event_id: String,
    pub event_type: ChargeEventType,
    /// Charge object embedded in the event (absent for non-charge events)
    pub charge: Option<Charge>,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderItemSide;

    fn items(n: usize) -> Vec<OrderItem> {
        (0..n)
            .map(|i| OrderItem {
                dish_id: format!("dish-{}", i),
                name: format!("Bún bò Huế số {}", i),
                unit_price: 1650,
                quantity: 1,
                sides: vec![OrderItemSide {
                    name: "Steamed Jasmine Rice".to_string(),
                    price: 400,
                }],
            })
            .collect()
    }

    fn context() -> ProvisionalContext<'static> {
        ProvisionalContext {
            name: "Linh",
            phone: "0400 000 000",
            email: Some("linh@example.com"),
            note: Some("no chilli"),
            pickup: PickupKind::Pickup,
            datetime: "2026-10-18 18:30",
        }
    }

    #[test]
    fn test_revisable_statuses() {
        assert!(ChargeStatus::RequiresPaymentMethod.is_revisable());
        assert!(ChargeStatus::RequiresConfirmation.is_revisable());
        assert!(ChargeStatus::RequiresAction.is_revisable());
        assert!(!ChargeStatus::Processing.is_revisable());
        assert!(!ChargeStatus::Succeeded.is_revisable());
        assert!(ChargeStatus::Canceled.is_terminal());
        assert_eq!(ChargeStatus::parse("requires_action"), ChargeStatus::RequiresAction);
        assert_eq!(ChargeStatus::parse("something_new"), ChargeStatus::Unknown);
    }

    #[test]
    fn test_provisional_metadata() {
        let meta = ChargeMetadata::provisional(
            context(),
            &items(1),
            1000,
            Currency::AUD,
            &SurchargeRates::default(),
        )
        .unwrap();

        assert_eq!(meta.base_amount(), Some(1000));
        assert_eq!(meta.get(keys::BASE_AMOUNT_DOLLARS), Some("10.00"));
        assert_eq!(meta.get("total_with_card_surcharge"), Some("1015"));
        assert_eq!(meta.get("card_surcharge_cents"), Some("15"));
        assert_eq!(meta.get("total_with_direct_debit_surcharge"), Some("1005"));
        assert_eq!(meta.get("direct_debit_surcharge_cents"), Some("5"));
        assert_eq!(meta.get(keys::PICKUP_TYPE), Some("pickup"));
        assert_eq!(meta.final_amount(), None);
    }

    #[test]
    fn test_long_item_lists_are_chunked() {
        let many = items(20);
        let mut meta = ChargeMetadata::new();
        meta.set_items(&many).unwrap();

        assert!(meta.get(keys::ITEMS_DATA).unwrap().starts_with("chunks:"));
        assert!(meta
            .iter()
            .all(|(_, v)| v.chars().count() <= MAX_METADATA_VALUE_LEN));
        assert_eq!(meta.items().unwrap().unwrap(), many);
    }

    #[test]
    fn test_too_many_items_rejected() {
        let mut meta = ChargeMetadata::new();
        assert!(matches!(
            meta.set_items(&items(1000)),
            Err(PaymentError::Validation(_))
        ));
    }

    #[test]
    fn test_order_draft_prefers_final_fields() {
        let mut meta = ChargeMetadata::provisional(
            context(),
            &items(1),
            2050,
            Currency::AUD,
            &SurchargeRates::default(),
        )
        .unwrap();
        meta.set_final_revision(&SurchargeQuote::new(
            &SurchargeRates::default(),
            2050,
            MethodKind::DirectDebit,
        ));

        let charge = Charge {
            id: "pi_123".to_string(),
            client_secret: None,
            amount: 2060,
            currency: "aud".to_string(),
            status: ChargeStatus::Succeeded,
            metadata: meta,
        };

        let (order, items) = charge
            .order_draft(PaymentStatus::Succeeded)
            .unwrap()
            .unwrap();
        assert_eq!(order.subtotal, 2050);
        assert_eq!(order.surcharge_amount, 10);
        assert_eq!(order.total, 2060);
        assert_eq!(order.payment_method, MethodKind::DirectDebit);
        assert_eq!(order.note.as_deref(), Some("no chilli"));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_order_draft_falls_back_to_charge_amount() {
        let meta = ChargeMetadata::provisional(
            context(),
            &items(1),
            2050,
            Currency::AUD,
            &SurchargeRates::default(),
        )
        .unwrap();
        let charge = Charge {
            id: "pi_456".to_string(),
            client_secret: None,
            amount: 2081,
            currency: "aud".to_string(),
            status: ChargeStatus::Succeeded,
            metadata: meta,
        };

        let (order, _) = charge
            .order_draft(PaymentStatus::Succeeded)
            .unwrap()
            .unwrap();
        assert_eq!(order.total, 2081);
        assert_eq!(order.surcharge_amount, 0);
        assert_eq!(order.payment_method, MethodKind::Card);
    }

    #[test]
    fn test_order_draft_skips_incomplete_metadata() {
        let mut meta = ChargeMetadata::new();
        meta.insert(keys::NAME, "Linh");
        let charge = Charge {
            id: "pi_789".to_string(),
            client_secret: None,
            amount: 1000,
            currency: "aud".to_string(),
            status: ChargeStatus::Succeeded,
            metadata: meta,
        };
        assert!(charge
            .order_draft(PaymentStatus::Succeeded)
            .unwrap()
            .is_none());
    }
}
