//! # Invoice
//!
//! The browser-built description of a prospective order. Prices arrive in
//! decimal currency units; every amount the server acts on is recomputed
//! here in minor units, never taken from a client-sent total.

use crate::error::{PaymentError, PaymentResult};
use crate::money::Currency;
use crate::order::{deserialize_dish_id, OrderItem, OrderItemSide, PickupKind, MAX_CHARGE_AMOUNT};
use serde::{Deserialize, Serialize};

/// A side chosen for a dish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSide {
    pub name: String,
    /// Decimal price, e.g. `4.0`
    #[serde(default)]
    pub price: f64,
}

/// A dish line as sent by the browser cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    #[serde(deserialize_with = "deserialize_dish_id")]
    pub id: String,
    pub name: String,
    /// Decimal unit price, e.g. `18.5`
    #[serde(rename = "dishPrice", alias = "dish_price", default)]
    pub dish_price: f64,
    #[serde(alias = "qty", default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub sides: Vec<InvoiceSide>,
}

fn default_quantity() -> u32 {
    1
}

/// Customer and pickup details sent alongside the items
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvoiceDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(alias = "pickupType", default, skip_serializing_if = "Option::is_none")]
    pub pickup_type: Option<String>,
    #[serde(default)]
    pub datetime: String,
}

/// Items plus customer details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub items: Vec<InvoiceItem>,
    #[serde(rename = "order", default)]
    pub details: InvoiceDetails,
}

impl Invoice {
    pub fn new(items: Vec<InvoiceItem>, details: InvoiceDetails) -> Self {
        Self { items, details }
    }

    /// Convert items to minor units, rejecting malformed lines
    pub fn order_items(&self, currency: Currency) -> PaymentResult<Vec<OrderItem>> {
        if self.items.is_empty() {
            return Err(PaymentError::Validation("Invoice has no items".to_string()));
        }

        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                if item.quantity == 0 {
                    return Err(PaymentError::Validation(format!(
                        "Item {} has zero quantity",
                        index
                    )));
                }
                let sides = item
                    .sides
                    .iter()
                    .map(|side| {
                        Ok(OrderItemSide {
                            name: side.name.clone(),
                            price: to_minor(currency, side.price, index)?,
                        })
                    })
                    .collect::<PaymentResult<Vec<_>>>()?;

                Ok(OrderItem {
                    dish_id: item.id.clone(),
                    name: item.name.clone(),
                    unit_price: to_minor(currency, item.dish_price, index)?,
                    quantity: item.quantity,
                    sides,
                })
            })
            .collect()
    }

    /// Pre-surcharge total in minor units
    pub fn base_amount(&self, currency: Currency) -> PaymentResult<i64> {
        self.priced_items(currency).map(|(_, amount)| amount)
    }

    /// Items in minor units with their base amount, capped at the processor maximum
    pub fn priced_items(&self, currency: Currency) -> PaymentResult<(Vec<OrderItem>, i64)> {
        let items = self.order_items(currency)?;
        match OrderItem::total_of(&items) {
            Some(amount) if amount <= MAX_CHARGE_AMOUNT => Ok((items, amount)),
            _ => Err(exceeds_maximum()),
        }
    }

    /// Pickup kind, defaulting to counter pickup
    pub fn pickup_kind(&self) -> PickupKind {
        self.details
            .pickup_type
            .as_deref()
            .and_then(PickupKind::parse)
            .unwrap_or_default()
    }

    /// Customer email, ignoring blanks
    pub fn email(&self) -> Option<&str> {
        self.details
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

fn to_minor(currency: Currency, price: f64, index: usize) -> PaymentResult<i64> {
    if !price.is_finite() || price < 0.0 {
        return Err(PaymentError::Validation(format!(
            "Item {} has an invalid price",
            index
        )));
    }
    let minor = currency.to_smallest_unit(price);
    if minor > MAX_CHARGE_AMOUNT {
        return Err(exceeds_maximum());
    }
    Ok(minor)
}

fn exceeds_maximum() -> PaymentError {
    PaymentError::Validation(format!(
        "Order total exceeds the maximum charge of {} minor units",
        MAX_CHARGE_AMOUNT
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn browser_invoice() -> Invoice {
        serde_json::from_value(json!({
            "items": [
                {
                    "id": 3,
                    "name": "Pho Bo",
                    "dishPrice": 18.5,
                    "qty": 2,
                    "sides": [{"name": "Rice Noodle", "price": 4}]
                },
                {
                    "id": "bun-cha",
                    "name": "Bun Cha",
                    "dishPrice": 16.9
                }
            ],
            "order": {
                "name": "Linh",
                "phone": "0400 000 000",
                "email": "linh@example.com",
                "pickupType": "reservation",
                "datetime": "2026-10-18 19:00"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_browser_shape() {
        let invoice = browser_invoice();
        assert_eq!(invoice.items[0].id, "3");
        assert_eq!(invoice.items[0].quantity, 2);
        assert_eq!(invoice.items[1].quantity, 1);
        assert_eq!(invoice.pickup_kind(), PickupKind::Reservation);
        assert_eq!(invoice.email(), Some("linh@example.com"));
    }

    #[test]
    fn test_base_amount_in_minor_units() {
        let invoice = browser_invoice();
        // (18.50 + 4.00) * 2 + 16.90
        assert_eq!(invoice.base_amount(Currency::AUD).unwrap(), 6190);
    }

    #[test]
    fn test_rejects_empty_and_negative() {
        let mut invoice = browser_invoice();
        invoice.items[1].dish_price = -1.0;
        assert!(matches!(
            invoice.base_amount(Currency::AUD),
            Err(PaymentError::Validation(_))
        ));

        invoice.items.clear();
        assert!(invoice.base_amount(Currency::AUD).is_err());
    }

    #[test]
    fn test_huge_prices_are_rejected_not_overflowed() {
        let mut invoice = browser_invoice();
        invoice.items[0].dish_price = 5.0e16;
        invoice.items[0].quantity = 2;
        assert!(matches!(
            invoice.base_amount(Currency::AUD),
            Err(PaymentError::Validation(_))
        ));

        // Each line fits, the sum does not
        let mut invoice = browser_invoice();
        invoice.items[0].dish_price = 600_000.0;
        invoice.items[0].quantity = 2;
        invoice.items[0].sides.clear();
        assert!(matches!(
            invoice.base_amount(Currency::AUD),
            Err(PaymentError::Validation(_))
        ));
    }

    #[test]
    fn test_defaults_to_pickup() {
        let mut invoice = browser_invoice();
        invoice.details.pickup_type = None;
        assert_eq!(invoice.pickup_kind(), PickupKind::Pickup);
        invoice.details.email = Some("   ".to_string());
        assert_eq!(invoice.email(), None);
    }
}
