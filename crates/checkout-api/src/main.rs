//! # quan-checkout
//!
//! Checkout and payment backend for the restaurant site.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export API_KEY=...
//! export DATABASE_URL=sqlite://orders.db
//!
//! # Run the server
//! quan-checkout
//! ```

use checkout_api::{routes, state::AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    print_banner();

    let state = AppState::new().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Allowed origins: {:?}", state.config.allowed_origins);
    info!("Surcharge rates: {:?}", state.manager.rates().as_percentages());

    // Expired rate-limit windows are swept hourly
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });

    let app = routes::create_router(state);

    info!("quan-checkout listening on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Payment intent: POST http://{}/create-payment-intent", addr);
        info!("Webhook: POST http://{}/webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

fn print_banner() {
    println!(
        r#"
  quan-checkout
  ━━━━━━━━━━━━━━━━━━━━━━━
  Restaurant payments
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
