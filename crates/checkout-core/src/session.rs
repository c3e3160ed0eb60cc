//! # Checkout Session
//!
//! Cart lines and customer details collected before payment. Produces the
//! [`Invoice`] sent to open a provisional charge and is cleared in one step
//! once the order is placed.

use crate::error::PaymentResult;
use crate::invoice::{Invoice, InvoiceDetails, InvoiceItem, InvoiceSide};
use crate::money::Currency;
use crate::order::PickupKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub lines: Vec<InvoiceItem>,
    pub customer: InvoiceDetails,
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dish. The same dish with the same sides bumps the existing line.
    pub fn add_item(&mut self, item: InvoiceItem) {
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.id == item.id && same_sides(&l.sides, &item.sides))
        {
            line.quantity = line.quantity.saturating_add(item.quantity);
            return;
        }
        self.lines.push(item);
    }

    /// Set a line's quantity; zero removes it
    pub fn set_quantity(&mut self, index: usize, quantity: u32) {
        if quantity == 0 {
            if index < self.lines.len() {
                self.lines.remove(index);
            }
        } else if let Some(line) = self.lines.get_mut(index) {
            line.quantity = quantity;
        }
    }

    pub fn with_customer(
        mut self,
        name: impl Into<String>,
        phone: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        self.customer.name = name.into();
        self.customer.phone = phone.into();
        self.customer.email = email;
        self
    }

    pub fn with_pickup(mut self, pickup: PickupKind, datetime: impl Into<String>) -> Self {
        self.customer.pickup_type = Some(pickup.as_str().to_string());
        self.customer.datetime = datetime.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.customer.note = Some(note.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |n, l| n.saturating_add(l.quantity))
    }

    /// Pre-surcharge total in minor units
    pub fn subtotal(&self, currency: Currency) -> PaymentResult<i64> {
        self.to_invoice().base_amount(currency)
    }

    pub fn to_invoice(&self) -> Invoice {
        Invoice::new(self.lines.clone(), self.customer.clone())
    }

    /// Drop cart lines and customer details together
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn same_sides(a: &[InvoiceSide], b: &[InvoiceSide]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name == y.name)
}
