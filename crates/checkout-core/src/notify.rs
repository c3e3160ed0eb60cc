//! # Order Notifications
//!
//! The reconciler hands a notice to a [`Notifier`] once per created order and
//! on failed charges. Delivery is best-effort: a failed notice is logged and
//! never undoes a persisted order.

use crate::error::PaymentResult;
use crate::money::Currency;
use crate::order::{NewOrder, OrderId, OrderItem};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Outcome reported in a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    Succeeded,
    Failed,
}

impl NoticeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeStatus::Succeeded => "succeeded",
            NoticeStatus::Failed => "failed",
        }
    }
}

/// Everything a notifier needs to describe an order
#[derive(Debug, Clone, Serialize)]
pub struct OrderNotice {
    /// Present once the order is persisted
    pub order_id: Option<OrderId>,
    pub status: NoticeStatus,
    pub order: NewOrder,
    pub items: Vec<OrderItem>,
    pub currency: Currency,
}

impl OrderNotice {
    pub fn subject(&self) -> String {
        let heading = match self.status {
            NoticeStatus::Succeeded => "Order Confirmation",
            NoticeStatus::Failed => "Order Status Update",
        };
        format!("{} - {}", heading, self.order.name)
    }

    /// Customer copy address, if the customer gave one
    pub fn customer_email(&self) -> Option<&str> {
        self.order
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Plain-text summary used as the message body
    pub fn summary(&self) -> String {
        let money = |amount: i64| self.currency.display(amount);
        let mut out = String::new();
        let _ = writeln!(out, "Payment Status: {}", self.status.as_str());
        if let Some(id) = self.order_id {
            let _ = writeln!(out, "Order: #{}", id);
        }
        let _ = writeln!(out, "Name: {}", self.order.name);
        let _ = writeln!(out, "Phone: {}", self.order.phone);
        if let Some(email) = self.customer_email() {
            let _ = writeln!(out, "Email: {}", email);
        }
        let _ = writeln!(out, "Pickup Type: {}", self.order.pickup_type.as_str());
        let _ = writeln!(out, "Date/Time: {}", self.order.datetime);
        let _ = writeln!(
            out,
            "Note: {}",
            self.order.note.as_deref().unwrap_or("N/A")
        );

        out.push_str("\nItems:\n");
        for item in &self.items {
            let _ = writeln!(
                out,
                "  {} x {} - {}",
                item.quantity,
                item.name,
                money(item.unit_price)
            );
            for side in &item.sides {
                let _ = writeln!(out, "    - {} ({})", side.name, money(side.price));
            }
        }

        let _ = writeln!(out, "\nSubtotal: {}", money(self.order.subtotal));
        if self.order.surcharge_amount > 0 {
            let _ = writeln!(
                out,
                "Payment Method: {}",
                self.order.payment_method.label()
            );
            let _ = writeln!(
                out,
                "Processing Fee: {}",
                money(self.order.surcharge_amount)
            );
        }
        let _ = writeln!(out, "Total Paid: {}", money(self.order.total));
        let _ = writeln!(out, "Payment ID: {}", self.order.charge_id);
        out
    }
}

/// Delivers order notices (mail relay, log, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &OrderNotice) -> PaymentResult<()>;

    fn name(&self) -> &'static str;
}

pub type BoxedNotifier = Arc<dyn Notifier>;

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use crate::error::PaymentError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Keeps every notice; optionally fails each delivery
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub notices: Mutex<Vec<OrderNotice>>,
        pub fail: AtomicBool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self) -> usize {
            self.notices.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notice: &OrderNotice) -> PaymentResult<()> {
            self.notices.lock().unwrap().push(notice.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(PaymentError::NotificationFailed("relay down".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::{sample_items, sample_order};

    #[test]
    fn test_summary_lists_items_and_totals() {
        let notice = OrderNotice {
            order_id: Some(7),
            status: NoticeStatus::Succeeded,
            order: sample_order("pi_1"),
            items: sample_items(),
            currency: Currency::AUD,
        };

        assert_eq!(notice.subject(), "Order Confirmation - Linh");
        let body = notice.summary();
        assert!(body.contains("Order: #7"));
        assert!(body.contains("2 x Pho Bo - A$18.00"));
        assert!(body.contains("- Extra meats (A$7.00)"));
        assert!(body.contains("Processing Fee: A$0.93"));
        assert!(body.contains("Total Paid: A$62.93"));
    }

    #[test]
    fn test_failed_notice_subject() {
        let notice = OrderNotice {
            order_id: None,
            status: NoticeStatus::Failed,
            order: sample_order("pi_2"),
            items: vec![],
            currency: Currency::AUD,
        };
        assert_eq!(notice.subject(), "Order Status Update - Linh");
        assert!(!notice.summary().contains("Order: #"));
    }
}
