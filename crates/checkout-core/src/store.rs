//! # Order Store Trait
//!
//! Durable order persistence. An order row, its item rows and their side rows
//! are written in one transaction: all of them or none.

use crate::error::PaymentResult;
use crate::order::{NewOrder, OrderCreation, OrderId, OrderItem};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Validate and write an order with its items. Returns the new order id.
    ///
    /// Fails with `InvalidOrderData` before any write when fields are missing,
    /// and with `PersistenceFailed` when the transaction rolled back.
    async fn create_order(&self, order: &NewOrder, items: &[OrderItem]) -> PaymentResult<OrderId>;

    /// Like [`create_order`](Self::create_order), but a second call for the
    /// same charge id returns `OrderCreation::Existing` and writes nothing.
    async fn create_order_once(
        &self,
        order: &NewOrder,
        items: &[OrderItem],
    ) -> PaymentResult<OrderCreation>;

    /// Order id recorded for a charge, if any
    async fn find_order_by_charge(&self, charge_id: &str) -> PaymentResult<Option<OrderId>>;
}

pub type BoxedOrderStore = Arc<dyn OrderStore>;
