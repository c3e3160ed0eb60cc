//! # Application State
//!
//! Shared state for the Axum application: the intent manager, the webhook
//! reconciler, the order store and the API rate limiter.

use crate::auth::RateLimiter;
use crate::notify::{LoggingNotifier, MailRelayConfig, MailRelayNotifier};
use checkout_core::{
    BoxedChargeProcessor, BoxedNotifier, BoxedOrderStore, CheckoutSettings, PaymentIntentManager,
    WebhookReconciler,
};
use checkout_store::SqlOrderStore;
use checkout_stripe::StripeChargeProcessor;
use std::net::SocketAddr;
use std::sync::Arc;

/// Settings file search path, relative to the working directory
const SETTINGS_PATHS: &[&str] = &[
    "config/checkout.toml",
    "../config/checkout.toml",
    "../../config/checkout.toml",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Shared secret expected in `x-api-key` on `/api` routes
    pub api_key: String,
    /// Browser origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// SQL connection string
    pub database_url: String,
    /// Pool size for the order database
    pub database_max_connections: u32,
    /// Restaurant inbox for order notices
    pub owner_email: Option<String>,
    /// Outbound mail relay, when configured
    pub mail_relay: Option<MailRelayConfig>,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let owner_email = env_opt("OWNER_EMAIL");
        let mail_relay = match (env_opt("MAIL_RELAY_URL"), owner_email.clone()) {
            (Some(url), Some(owner)) => Some(MailRelayConfig {
                url,
                token: env_opt("MAIL_RELAY_TOKEN"),
                from: env_opt("MAIL_FROM").unwrap_or_else(|| owner.clone()),
                owner,
            }),
            _ => None,
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            allowed_origins: parse_origins(
                &std::env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://orders.db".to_string()),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(5),
            owner_email,
            mail_relay,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Comma-separated origin list, blanks dropped
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<PaymentIntentManager>,
    pub reconciler: Arc<WebhookReconciler>,
    pub store: BoxedOrderStore,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build the production state: Stripe, SQL store, mail relay
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let settings = CheckoutSettings::load(SETTINGS_PATHS)?;

        if config.api_key.is_empty() {
            tracing::warn!("API_KEY is not set; /api routes will reject every request");
        }

        let stripe = StripeChargeProcessor::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        let store = SqlOrderStore::connect(&config.database_url, config.database_max_connections)
            .await?;
        store.migrate().await?;

        let notifier: BoxedNotifier = match &config.mail_relay {
            Some(relay) => Arc::new(MailRelayNotifier::new(relay.clone())?),
            None => {
                tracing::warn!("MAIL_RELAY_URL or OWNER_EMAIL not set, order notices will only be logged");
                Arc::new(LoggingNotifier)
            }
        };

        Ok(Self::from_parts(
            config,
            settings,
            Arc::new(stripe),
            Arc::new(store),
            notifier,
        ))
    }

    /// Assemble state from explicit collaborators
    pub fn from_parts(
        config: AppConfig,
        settings: CheckoutSettings,
        processor: BoxedChargeProcessor,
        store: BoxedOrderStore,
        notifier: BoxedNotifier,
    ) -> Self {
        let currency = settings.currency;
        let manager = PaymentIntentManager::new(processor.clone(), settings);
        let reconciler = WebhookReconciler::new(processor, store.clone(), notifier, currency);

        Self {
            manager: Arc::new(manager),
            reconciler: Arc::new(reconciler),
            store,
            limiter: Arc::new(RateLimiter::default()),
            config: Arc::new(config),
        }
    }

    /// Replace the API rate limiter
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }
}
