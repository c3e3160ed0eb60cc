//! # checkout-core
//!
//! Core types and services for the quan-checkout payment flow.
//!
//! This crate provides:
//! - Surcharge rules (`SurchargeRates`, `MethodKind`) shared by server and browser
//! - `Invoice`, `Charge` and `NewOrder` for the checkout data flow
//! - `ChargeProcessor`, `OrderStore` and `Notifier` traits for external systems
//! - `PaymentIntentManager` to open and revise charges
//! - `WebhookReconciler` to turn settled charges into orders exactly once
//! - `Debouncer` and `DebouncedReviser` to coalesce client method changes
//! - `PaymentError` for typed error handling
//!
//! The async services sit behind the default `runtime` feature so the pure
//! types build for `wasm32`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::{CheckoutSettings, MethodKind, PaymentIntentManager};
//!
//! let manager = PaymentIntentManager::new(processor, CheckoutSettings::default());
//!
//! // Charge the worst case up front
//! let opened = manager.open_provisional_charge(&invoice).await?;
//!
//! // Customer picked direct debit
//! manager.revise_charge_amount(&opened.charge_id, MethodKind::DirectDebit).await?;
//! ```

pub mod charge;
pub mod debounce;
pub mod error;
pub mod invoice;
pub mod money;
pub mod notify;
pub mod order;
pub mod processor;
pub mod session;
pub mod settings;
pub mod store;
pub mod surcharge;

#[cfg(feature = "runtime")]
pub mod intent;
#[cfg(feature = "runtime")]
pub mod locks;
#[cfg(feature = "runtime")]
pub mod reconcile;
#[cfg(feature = "runtime")]
pub mod reviser;

// Re-exports for convenience
pub use charge::{
    Charge, ChargeEvent, ChargeEventType, ChargeMetadata, ChargeStatus, ChargeUpdate, NewCharge,
};
pub use debounce::{CallOutcome, DebounceConfig, DebounceState, Debouncer, Dispatch};
pub use error::{PaymentError, PaymentResult};
pub use invoice::{Invoice, InvoiceDetails, InvoiceItem, InvoiceSide};
pub use money::Currency;
pub use notify::{BoxedNotifier, NoticeStatus, Notifier, OrderNotice};
pub use order::{
    NewOrder, OrderCreation, OrderId, OrderItem, OrderItemSide, PaymentStatus, PickupKind,
    MAX_CHARGE_AMOUNT,
};
pub use processor::{BoxedChargeProcessor, ChargeProcessor};
pub use session::CheckoutSession;
pub use settings::CheckoutSettings;
pub use store::{BoxedOrderStore, OrderStore};
pub use surcharge::{BasisPoints, MethodKind, SurchargeQuote, SurchargeRates};

#[cfg(feature = "runtime")]
pub use intent::{PaymentIntentManager, ProvisionalCharge, Revision};
#[cfg(feature = "runtime")]
pub use reconcile::{Acknowledgement, WebhookReconciler};
#[cfg(feature = "runtime")]
pub use reviser::{DebouncedReviser, DrainReport, RevisionTransport, ReviserSnapshot};
