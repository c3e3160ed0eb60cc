//! # checkout-api
//!
//! HTTP API layer for quan-checkout.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Payment intent creation and revision endpoints
//! - Signed Stripe webhook intake
//! - API-key guard and rate limiting for `/api`
//! - Mail-relay order notices and an HTTP revision transport
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/create-payment-intent` | Open provisional charge |
//! | GET | `/surcharge-rates` | Surcharge table |
//! | POST | `/api/update-payment-intent-amount` | Revise charge amount |
//! | POST | `/api/save-order` | Persist an order |
//! | POST | `/webhook` | Stripe webhook |

pub mod auth;
pub mod client;
pub mod handlers;
pub mod notify;
pub mod routes;
pub mod state;

pub use client::ApiRevisionTransport;
pub use routes::create_router;
pub use state::{AppConfig, AppState};
