//! # Charge Processor Trait
//!
//! Seam between the checkout engine and the external payment processor.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ChargeProcessor (trait)                   │
//! │  ├── create_charge()                                        │
//! │  ├── retrieve_charge()                                      │
//! │  ├── update_charge()                                        │
//! │  ├── verify_event()                                         │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                 ┌──────────┴──────────┐
//!                 │                     │
//!        ┌────────┴────────┐   ┌────────┴────────┐
//!        │ StripeCharge    │   │ test fakes      │
//!        │   Processor     │   │ (in-memory)     │
//!        └─────────────────┘   └─────────────────┘
//! ```

use crate::charge::{Charge, ChargeEvent, ChargeUpdate, NewCharge};
use crate::error::PaymentResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the checkout engine needs from a payment processor.
#[async_trait]
pub trait ChargeProcessor: Send + Sync {
    /// Open a new charge and return it with its client secret.
    async fn create_charge(&self, charge: NewCharge) -> PaymentResult<Charge>;

    /// Fetch the current state of a charge.
    async fn retrieve_charge(&self, charge_id: &str) -> PaymentResult<Charge>;

    /// Change the amount of a charge and merge in metadata.
    ///
    /// Implementations map processor-side lock contention to
    /// `PaymentError::LockTimeout` and an already-progressed charge to
    /// `PaymentError::ChargeNotRevisable`.
    async fn update_charge(&self, charge_id: &str, update: ChargeUpdate) -> PaymentResult<Charge>;

    /// Verify a webhook signature over the raw body and parse the event.
    fn verify_event(&self, payload: &[u8], signature: &str) -> PaymentResult<ChargeEvent>;

    /// Provider name (for logging).
    fn provider_name(&self) -> &'static str;
}

/// Shared processor handle
pub type BoxedChargeProcessor = Arc<dyn ChargeProcessor>;
