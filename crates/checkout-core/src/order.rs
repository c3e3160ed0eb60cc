//! # Order Types
//!
//! Durable order records written once a charge settles, plus the
//! field validation that runs before any transaction is opened.

use crate::error::{PaymentError, PaymentResult};
use crate::surcharge::MethodKind;
use serde::{Deserialize, Deserializer, Serialize};

/// Generated order identifier
pub type OrderId = i64;

/// Largest single charge the processor accepts, in minor units
pub const MAX_CHARGE_AMOUNT: i64 = 99_999_999;

/// How the customer receives the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    /// Takeaway pickup at the counter
    Pickup,
    /// Dine-in with a table reservation
    Reservation,
}

impl PickupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickupKind::Pickup => "pickup",
            PickupKind::Reservation => "reservation",
        }
    }

    /// Lenient parse used for metadata and browser input ("Pickup", "reservation", ...)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pickup" | "pick up" | "takeaway" => Some(PickupKind::Pickup),
            "reservation" | "reserve" | "dine-in" | "dine_in" => Some(PickupKind::Reservation),
            _ => None,
        }
    }
}

impl Default for PickupKind {
    fn default() -> Self {
        PickupKind::Pickup
    }
}

/// Final payment status recorded on the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// A side selection on an order item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemSide {
    /// Side name
    #[serde(rename = "n")]
    pub name: String,

    /// Side price in minor units (charged once per item quantity)
    #[serde(rename = "p")]
    pub price: i64,
}

/// A dish line on an order.
///
/// Field names are abbreviated on the wire because the serialized list
/// travels inside charge metadata, which is size-limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Menu dish id
    #[serde(rename = "id", deserialize_with = "deserialize_dish_id")]
    pub dish_id: String,

    /// Dish name (denormalized for receipts)
    #[serde(rename = "n")]
    pub name: String,

    /// Unit price in minor units, excluding sides
    #[serde(rename = "p")]
    pub unit_price: i64,

    /// Quantity
    #[serde(rename = "q")]
    pub quantity: u32,

    /// Side selections
    #[serde(rename = "s", default, skip_serializing_if = "Vec::is_empty")]
    pub sides: Vec<OrderItemSide>,
}

impl OrderItem {
    /// Unit price plus every side, times quantity. `None` on overflow.
    pub fn line_total(&self) -> Option<i64> {
        self.sides
            .iter()
            .try_fold(self.unit_price, |acc, side| acc.checked_add(side.price))?
            .checked_mul(i64::from(self.quantity))
    }

    /// Sum of line totals. `None` on overflow.
    pub fn total_of(items: &[OrderItem]) -> Option<i64> {
        items
            .iter()
            .try_fold(0_i64, |acc, item| acc.checked_add(item.line_total()?))
    }

    fn validate(&self, index: usize) -> PaymentResult<()> {
        if self.dish_id.trim().is_empty() {
            return Err(invalid(format!("item {} is missing dish_id", index)));
        }
        if self.name.trim().is_empty() {
            return Err(invalid(format!("item {} is missing dish_name", index)));
        }
        if self.unit_price < 0 {
            return Err(invalid(format!("item {} has a negative dish_price", index)));
        }
        if self.quantity == 0 {
            return Err(invalid(format!("item {} has zero quantity", index)));
        }
        for side in &self.sides {
            if side.name.trim().is_empty() || side.price < 0 {
                return Err(invalid(format!("item {} has an invalid side", index)));
            }
        }
        if self.line_total().is_none() {
            return Err(invalid(format!("item {} total is out of range", index)));
        }
        Ok(())
    }
}

/// An order ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub pickup_type: PickupKind,
    /// Requested pickup/reservation time, as entered by the customer
    pub datetime: String,
    /// Base amount before surcharge, minor units
    pub subtotal: i64,
    /// Amount actually charged, minor units
    pub total: i64,
    /// Surcharge included in `total`
    #[serde(default)]
    pub surcharge_amount: i64,
    #[serde(default = "default_method")]
    pub payment_method: MethodKind,
    /// Processor charge id; one order per charge
    pub charge_id: String,
    pub payment_status: PaymentStatus,
}

fn default_method() -> MethodKind {
    MethodKind::Card
}

impl NewOrder {
    /// Check required order fields and every item before touching storage
    pub fn validate(&self, items: &[OrderItem]) -> PaymentResult<()> {
        let required = [
            ("name", self.name.as_str()),
            ("phone", self.phone.as_str()),
            ("datetime", self.datetime.as_str()),
            ("stripe_payment_id", self.charge_id.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(format!("missing field in order: {}", field)));
            }
        }
        if self.subtotal <= 0 {
            return Err(invalid("missing field in order: subtotal".to_string()));
        }
        if self.total <= 0 {
            return Err(invalid("missing field in order: total".to_string()));
        }
        if self.surcharge_amount < 0 {
            return Err(invalid("surcharge_amount must not be negative".to_string()));
        }
        if items.is_empty() {
            return Err(invalid("order has no items".to_string()));
        }
        for (index, item) in items.iter().enumerate() {
            item.validate(index)?;
        }
        Ok(())
    }
}

/// Result of an idempotent insert keyed by charge id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCreation {
    /// A new order row was written
    Created(OrderId),
    /// An order for this charge already existed; nothing was written
    Existing(OrderId),
}

impl OrderCreation {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderCreation::Created(id) | OrderCreation::Existing(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, OrderCreation::Created(_))
    }
}

fn invalid(message: String) -> PaymentError {
    PaymentError::InvalidOrderData(message)
}

/// Dish ids arrive as strings or numbers depending on the menu source
pub(crate) fn deserialize_dish_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_items() -> Vec<OrderItem> {
        vec![
            OrderItem {
                dish_id: "pho-bo".to_string(),
                name: "Pho Bo".to_string(),
                unit_price: 1800,
                quantity: 2,
                sides: vec![OrderItemSide {
                    name: "Extra meats".to_string(),
                    price: 700,
                }],
            },
            OrderItem {
                dish_id: "12".to_string(),
                name: "Banh Mi".to_string(),
                unit_price: 1200,
                quantity: 1,
                sides: vec![],
            },
        ]
    }

    pub(crate) fn sample_order(charge_id: &str) -> NewOrder {
        NewOrder {
            name: "Linh".to_string(),
            phone: "0400 000 000".to_string(),
            email: Some("linh@example.com".to_string()),
            note: None,
            pickup_type: PickupKind::Pickup,
            datetime: "2026-10-18 18:30".to_string(),
            subtotal: 6200,
            total: 6293,
            surcharge_amount: 93,
            payment_method: MethodKind::Card,
            charge_id: charge_id.to_string(),
            payment_status: PaymentStatus::Succeeded,
        }
    }

    #[test]
    fn test_line_total_counts_sides_per_quantity() {
        let items = sample_items();
        assert_eq!(items[0].line_total(), Some((1800 + 700) * 2));
        assert_eq!(items[1].line_total(), Some(1200));
        assert_eq!(OrderItem::total_of(&items), Some(6200));
    }

    #[test]
    fn test_line_total_overflow_is_rejected() {
        let mut items = sample_items();
        items[0].unit_price = i64::MAX / 2;
        assert_eq!(items[0].line_total(), None);
        assert_eq!(OrderItem::total_of(&items), None);
        assert!(matches!(
            sample_order("pi_1").validate(&items),
            Err(PaymentError::InvalidOrderData(_))
        ));
    }

    #[test]
    fn test_validate_accepts_complete_order() {
        assert!(sample_order("pi_1").validate(&sample_items()).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut order = sample_order("pi_1");
        order.phone = "  ".to_string();
        let err = order.validate(&sample_items()).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidOrderData(ref m) if m.contains("phone")));

        let mut order = sample_order("");
        order.phone = "0400".to_string();
        let err = order.validate(&sample_items()).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidOrderData(ref m) if m.contains("stripe_payment_id")));
    }

    #[test]
    fn test_validate_rejects_bad_items() {
        let order = sample_order("pi_1");
        let mut items = sample_items();
        items[1].quantity = 0;
        assert!(matches!(
            order.validate(&items),
            Err(PaymentError::InvalidOrderData(_))
        ));

        let mut items = sample_items();
        items[0].sides[0].name.clear();
        assert!(order.validate(&items).is_err());

        assert!(order.validate(&[]).is_err());
    }

    #[test]
    fn test_item_wire_format_is_compact() {
        let json = serde_json::to_string(&sample_items()[1]).unwrap();
        assert_eq!(json, r#"{"id":"12","n":"Banh Mi","p":1200,"q":1}"#);

        let parsed: OrderItem = serde_json::from_str(r#"{"id":12,"n":"Banh Mi","p":1200,"q":1}"#).unwrap();
        assert_eq!(parsed.dish_id, "12");
    }

    #[test]
    fn test_pickup_kind_parse() {
        assert_eq!(PickupKind::parse("Pickup"), Some(PickupKind::Pickup));
        assert_eq!(PickupKind::parse("reservation"), Some(PickupKind::Reservation));
        assert_eq!(PickupKind::parse("drone"), None);
    }
}
