//! # checkout-stripe
//!
//! Stripe PaymentIntents processor for quan-checkout.
//!
//! [`StripeChargeProcessor`] implements `checkout_core::ChargeProcessor`:
//!
//! - `create_charge` opens a PaymentIntent with automatic payment methods
//! - `retrieve_charge` / `update_charge` read and re-price an intent
//! - `verify_event` checks the `Stripe-Signature` header and parses the event
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use checkout_stripe::StripeChargeProcessor;
//! use checkout_core::{CheckoutSettings, PaymentIntentManager};
//! use std::sync::Arc;
//!
//! let stripe = Arc::new(StripeChargeProcessor::from_env()?);
//! let manager = PaymentIntentManager::new(stripe, CheckoutSettings::default());
//! ```
//!
//! ## Webhook Setup
//!
//! Enable [`REQUIRED_WEBHOOK_EVENTS`] on the endpoint and put its signing
//! secret (`whsec_...`) in `STRIPE_WEBHOOK_SECRET`. For local testing:
//!
//! ```text
//! stripe listen --forward-to localhost:5001/webhook
//! ```

pub mod config;
pub mod intents;
pub mod webhook;

// Re-exports
pub use config::StripeConfig;
pub use intents::StripeChargeProcessor;
pub use webhook::{parse_event, signature_header, verify_signature, REQUIRED_WEBHOOK_EVENTS};
