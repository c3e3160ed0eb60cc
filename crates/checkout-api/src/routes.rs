//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::auth;
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Create the main application router
///
/// Routes:
/// - Public:
///   - POST /create-payment-intent - Open a provisional charge
///   - GET  /surcharge-rates - Surcharge percentages per method
///   - GET  /health - Liveness
///
/// - API (x-api-key, rate limited):
///   - POST /api/update-payment-intent-amount - Revise for the chosen method
///   - POST /api/save-order - Persist an order
///
/// - Webhooks:
///   - POST /webhook - Stripe webhook (raw body)
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    // The key check wraps the limiter so rejected callers use no quota
    let api_routes = Router::new()
        .route(
            "/update-payment-intent-amount",
            post(handlers::update_payment_intent_amount),
        )
        .route("/save-order", post(handlers::save_order))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::require_api_key,
                ))
                .layer(middleware::from_fn_with_state(state.clone(), auth::rate_limit)),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .route("/create-payment-intent", post(handlers::create_payment_intent))
        .route("/surcharge-rates", get(handlers::surcharge_rates))
        .route("/webhook", post(handlers::webhook))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::API_KEY_HEADER),
        ])
        .allow_credentials(true)
}
