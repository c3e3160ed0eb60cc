//! # Webhook Reconciler
//!
//! Turns a settled charge into exactly one persisted order.
//!
//! Once the signature checks out the event is always acknowledged. Failures
//! after that point are logged for manual recovery and are not redelivered:
//! a retried partial side effect (second order, second email) costs more than
//! a logged miss.

use crate::charge::{ChargeEvent, ChargeEventType};
use crate::error::PaymentResult;
use crate::locks::KeyedLocks;
use crate::money::Currency;
use crate::notify::{BoxedNotifier, NoticeStatus, OrderNotice};
use crate::order::{OrderCreation, OrderId, PaymentStatus};
use crate::processor::BoxedChargeProcessor;
use crate::store::BoxedOrderStore;
use tracing::{error, info, instrument, warn};

/// What happened to a verified event. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// A new order was written (and a notice attempted)
    OrderCreated { order_id: OrderId },
    /// The charge already had an order; nothing written or sent
    Duplicate { order_id: OrderId },
    /// A failure notice was attempted for a failed charge
    FailureNoticed,
    /// The event lacked what was needed to act on it
    Skipped { reason: String },
    /// Event type this service does not handle
    Ignored { event_type: String },
    /// Processing failed after verification; logged, not retried
    Failed { reason: String },
}

pub struct WebhookReconciler {
    processor: BoxedChargeProcessor,
    store: BoxedOrderStore,
    notifier: BoxedNotifier,
    currency: Currency,
    locks: KeyedLocks,
}

impl WebhookReconciler {
    pub fn new(
        processor: BoxedChargeProcessor,
        store: BoxedOrderStore,
        notifier: BoxedNotifier,
        currency: Currency,
    ) -> Self {
        Self {
            processor,
            store,
            notifier,
            currency,
            locks: KeyedLocks::new(),
        }
    }

    /// Verify the raw body, then reconcile. Only a verification failure is an `Err`.
    pub async fn handle(&self, payload: &[u8], signature: &str) -> PaymentResult<Acknowledgement> {
        let event = self.processor.verify_event(payload, signature)?;
        Ok(self.reconcile(event).await)
    }

    /// Act on an already verified event
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn reconcile(&self, event: ChargeEvent) -> Acknowledgement {
        let ack = match event.event_type {
            ChargeEventType::Succeeded => self.on_succeeded(event).await,
            ChargeEventType::PaymentFailed => self.on_failed(event).await,
            ChargeEventType::Other(event_type) => {
                info!(%event_type, "Ignoring unhandled event type");
                Acknowledgement::Ignored { event_type }
            }
        };
        if let Acknowledgement::Failed { reason } = &ack {
            error!(%reason, "Webhook processing failed; acknowledged without retry");
        }
        ack
    }

    async fn on_succeeded(&self, event: ChargeEvent) -> Acknowledgement {
        let Some(charge) = event.charge else {
            return skipped("event carries no charge");
        };

        let draft = match charge.order_draft(PaymentStatus::Succeeded) {
            Ok(Some(draft)) => draft,
            Ok(None) => {
                warn!(charge_id = %charge.id, "Charge metadata has no name or items_data, skipping");
                return skipped("metadata missing name or items_data");
            }
            Err(e) => {
                return Acknowledgement::Failed {
                    reason: format!("could not rebuild order for {}: {}", charge.id, e),
                }
            }
        };
        let (order, items) = draft;

        let created = self
            .locks
            .run(&charge.id, self.store.create_order_once(&order, &items))
            .await;

        match created {
            Ok(OrderCreation::Created(order_id)) => {
                info!(order_id, charge_id = %charge.id, total = order.total, "Order created");
                let notice = OrderNotice {
                    order_id: Some(order_id),
                    status: NoticeStatus::Succeeded,
                    order,
                    items,
                    currency: self.currency,
                };
                self.send(&notice).await;
                Acknowledgement::OrderCreated { order_id }
            }
            Ok(OrderCreation::Existing(order_id)) => {
                info!(order_id, charge_id = %charge.id, "Order already recorded, skipping");
                Acknowledgement::Duplicate { order_id }
            }
            Err(e) => Acknowledgement::Failed {
                reason: format!("could not persist order for {}: {}", charge.id, e),
            },
        }
    }

    async fn on_failed(&self, event: ChargeEvent) -> Acknowledgement {
        let Some(charge) = event.charge else {
            return skipped("event carries no charge");
        };
        warn!(charge_id = %charge.id, "Payment failed");

        let (order, items) = match charge.order_draft(PaymentStatus::Failed) {
            Ok(Some(draft)) => draft,
            Ok(None) => return skipped("metadata missing name or items_data"),
            Err(e) => {
                return Acknowledgement::Failed {
                    reason: format!("could not read metadata for {}: {}", charge.id, e),
                }
            }
        };
        if order.email.is_none() {
            return skipped("no customer email for failure notice");
        }

        let notice = OrderNotice {
            order_id: None,
            status: NoticeStatus::Failed,
            order,
            items,
            currency: self.currency,
        };
        self.send(&notice).await;
        Acknowledgement::FailureNoticed
    }

    async fn send(&self, notice: &OrderNotice) {
        if let Err(e) = self.notifier.notify(notice).await {
            error!(
                notifier = self.notifier.name(),
                charge_id = %notice.order.charge_id,
                "Notification failed: {}",
                e
            );
        }
    }
}

fn skipped(reason: &str) -> Acknowledgement {
    Acknowledgement::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::{Charge, ChargeMetadata, ChargeStatus, ProvisionalContext};
    use crate::error::PaymentError;
    use crate::notify::recording::RecordingNotifier;
    use crate::order::tests::sample_items;
    use crate::order::{OrderItem, PickupKind};
    use crate::processor::fake::FakeProcessor;
    use crate::store::memory::MemoryStore;
    use crate::surcharge::{MethodKind, SurchargeQuote, SurchargeRates};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct Harness {
        fake: Arc<FakeProcessor>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        reconciler: Arc<WebhookReconciler>,
    }

    fn harness() -> Harness {
        let fake = Arc::new(FakeProcessor::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let reconciler = Arc::new(WebhookReconciler::new(
            fake.clone(),
            store.clone(),
            notifier.clone(),
            Currency::AUD,
        ));
        Harness {
            fake,
            store,
            notifier,
            reconciler,
        }
    }

    fn settled_charge(id: &str, email: Option<&str>, revised: Option<MethodKind>) -> Charge {
        let items = sample_items();
        let base = OrderItem::total_of(&items).unwrap();
        let rates = SurchargeRates::default();
        let mut metadata = ChargeMetadata::provisional(
            ProvisionalContext {
                name: "Linh",
                phone: "0400 000 000",
                email,
                note: None,
                pickup: PickupKind::Pickup,
                datetime: "2026-10-18 18:30",
            },
            &items,
            base,
            Currency::AUD,
            &rates,
        )
        .unwrap();
        let mut amount = rates.provisional_total(base);
        if let Some(kind) = revised {
            let quote = SurchargeQuote::new(&rates, base, kind);
            metadata.set_final_revision(&quote);
            amount = quote.total;
        }
        Charge {
            id: id.to_string(),
            client_secret: None,
            amount,
            currency: "aud".to_string(),
            status: ChargeStatus::Succeeded,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_succeeded_creates_order_and_notifies() {
        let h = harness();
        h.fake
            .insert(settled_charge("pi_1", Some("linh@example.com"), Some(MethodKind::DirectDebit)));

        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_1", ChargeEventType::Succeeded))
            .await;

        assert_eq!(ack, Acknowledgement::OrderCreated { order_id: 1 });
        let order = h.store.order("pi_1").unwrap();
        assert_eq!(order.subtotal, 6200);
        assert_eq!(order.surcharge_amount, 31);
        assert_eq!(order.total, 6231);
        assert_eq!(order.payment_method, MethodKind::DirectDebit);
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(
            h.notifier.notices.lock().unwrap()[0].status,
            NoticeStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_unrevised_charge_falls_back_to_settled_amount() {
        let h = harness();
        h.fake.insert(settled_charge("pi_wallet", None, None));

        h.reconciler
            .reconcile(h.fake.event("pi_wallet", ChargeEventType::Succeeded))
            .await;

        let order = h.store.order("pi_wallet").unwrap();
        assert_eq!(order.total, 6293);
        assert_eq!(order.surcharge_amount, 0);
        assert_eq!(order.payment_method, MethodKind::Card);
    }

    #[tokio::test]
    async fn test_redelivery_is_a_duplicate() {
        let h = harness();
        h.fake.insert(settled_charge("pi_1", None, Some(MethodKind::Card)));

        let first = h
            .reconciler
            .reconcile(h.fake.event("pi_1", ChargeEventType::Succeeded))
            .await;
        let second = h
            .reconciler
            .reconcile(h.fake.event("pi_1", ChargeEventType::Succeeded))
            .await;

        assert_eq!(first, Acknowledgement::OrderCreated { order_id: 1 });
        assert_eq!(second, Acknowledgement::Duplicate { order_id: 1 });
        assert_eq!(h.store.count(), 1);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_create_one_order() {
        let h = harness();
        h.fake.insert(settled_charge("pi_race", None, Some(MethodKind::Card)));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let reconciler = h.reconciler.clone();
            let event = h.fake.event("pi_race", ChargeEventType::Succeeded);
            handles.push(tokio::spawn(async move { reconciler.reconcile(event).await }));
        }
        let mut created = 0;
        for handle in handles {
            if let Acknowledgement::OrderCreated { .. } = handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(h.store.count(), 1);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_skipped() {
        let h = harness();
        let mut charge = settled_charge("pi_bare", None, None);
        charge.metadata = ChargeMetadata::new();
        h.fake.insert(charge);

        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_bare", ChargeEventType::Succeeded))
            .await;
        assert!(matches!(ack, Acknowledgement::Skipped { .. }));
        assert_eq!(h.store.count(), 0);
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_acknowledged() {
        let h = harness();
        h.store.fail_writes.store(true, Ordering::SeqCst);
        h.fake.insert(settled_charge("pi_1", None, None));

        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_1", ChargeEventType::Succeeded))
            .await;
        assert!(matches!(ack, Acknowledgement::Failed { .. }));
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let h = harness();
        h.notifier.fail.store(true, Ordering::SeqCst);
        h.fake.insert(settled_charge("pi_1", None, None));

        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_1", ChargeEventType::Succeeded))
            .await;
        assert_eq!(ack, Acknowledgement::OrderCreated { order_id: 1 });
        assert_eq!(h.store.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_sends_notice_only() {
        let h = harness();
        let mut charge = settled_charge("pi_declined", Some("linh@example.com"), None);
        charge.status = ChargeStatus::PaymentFailed;
        h.fake.insert(charge);

        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_declined", ChargeEventType::PaymentFailed))
            .await;
        assert_eq!(ack, Acknowledgement::FailureNoticed);
        assert_eq!(h.store.count(), 0);
        assert_eq!(
            h.notifier.notices.lock().unwrap()[0].status,
            NoticeStatus::Failed
        );

        h.fake.insert(settled_charge("pi_anon", None, None));
        let ack = h
            .reconciler
            .reconcile(h.fake.event("pi_anon", ChargeEventType::PaymentFailed))
            .await;
        assert!(matches!(ack, Acknowledgement::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let h = harness();
        let ack = h
            .reconciler
            .reconcile(h.fake.event(
                "pi_none",
                ChargeEventType::Other("charge.refunded".to_string()),
            ))
            .await;
        assert_eq!(
            ack,
            Acknowledgement::Ignored {
                event_type: "charge.refunded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_before_any_work() {
        let h = harness();
        let err = h.reconciler.handle(b"{}", "t=1,v1=00").await.unwrap_err();
        assert!(matches!(err, PaymentError::WebhookVerificationFailed(_)));
        assert_eq!(h.store.count(), 0);
    }
}
