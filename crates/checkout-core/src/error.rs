//! # Checkout Error Types
//!
//! Typed error handling for the checkout engine.
//! All payment, persistence and notification operations return `Result<T, PaymentError>`.

use thiserror::Error;

/// Core error type for all checkout operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing or malformed request fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Charge total is below the processor's minimum chargeable amount
    #[error("Order total is too low: {amount} is below the minimum of {minimum}")]
    OrderTooSmall { amount: i64, minimum: i64 },

    /// Payment method kind outside the surcharge table
    #[error("Unknown payment method: {kind}")]
    UnknownMethodKind { kind: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Rate limited by the provider or the API
    #[error("Rate limited by {provider}, retry after {retry_after_secs} seconds")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    /// The provider could not acquire its lock on the charge in time
    #[error("Charge {charge_id} is locked by a concurrent update")]
    LockTimeout { charge_id: String },

    /// The charge left the amount-mutable states before the update landed
    #[error("Charge is {status} and can no longer be revised")]
    ChargeNotRevisable { status: String },

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Order or item fields missing before persistence
    #[error("Invalid order data: {0}")]
    InvalidOrderData(String),

    /// The order transaction failed and was rolled back
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    /// Outbound notification could not be delivered
    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::NetworkError(_)
                | PaymentError::RateLimited { .. }
                | PaymentError::LockTimeout { .. }
                | PaymentError::ProviderError { .. }
        )
    }

    /// Contention failures the client debouncer retries with backoff.
    pub fn is_transient_contention(&self) -> bool {
        matches!(
            self,
            PaymentError::RateLimited { .. } | PaymentError::LockTimeout { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::Validation(_) => 400,
            PaymentError::OrderTooSmall { .. } => 400,
            PaymentError::UnknownMethodKind { .. } => 400,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError(_) => 503,
            PaymentError::RateLimited { .. } => 429,
            PaymentError::LockTimeout { .. } => 409,
            PaymentError::ChargeNotRevisable { .. } => 409,
            PaymentError::WebhookVerificationFailed(_) => 400,
            PaymentError::WebhookParseError(_) => 400,
            PaymentError::InvalidOrderData(_) => 400,
            PaymentError::PersistenceFailed(_) => 500,
            PaymentError::NotificationFailed(_) => 502,
            PaymentError::Internal(_) => 500,
            PaymentError::Serialization(_) => 500,
        }
    }

    /// Short machine-readable name, used as the `error` field of API responses
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::Configuration(_) => "ConfigurationError",
            PaymentError::Validation(_) => "ValidationError",
            PaymentError::OrderTooSmall { .. } => "OrderTooSmall",
            PaymentError::UnknownMethodKind { .. } => "ValidationError",
            PaymentError::ProviderError { .. } => "ProviderError",
            PaymentError::NetworkError(_) => "NetworkError",
            PaymentError::RateLimited { .. } => "RateLimited",
            PaymentError::LockTimeout { .. } => "LockTimeout",
            PaymentError::ChargeNotRevisable { .. } => "NotRevisable",
            PaymentError::WebhookVerificationFailed(_) => "SignatureVerificationFailed",
            PaymentError::WebhookParseError(_) => "SignatureVerificationFailed",
            PaymentError::InvalidOrderData(_) => "InvalidOrderData",
            PaymentError::PersistenceFailed(_) => "PersistenceFailed",
            PaymentError::NotificationFailed(_) => "NotificationFailed",
            PaymentError::Internal(_) => "InternalError",
            PaymentError::Serialization(_) => "InternalError",
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

/// Result type alias for checkout operations
pub type PaymentResult<T> = Result<T, PaymentError>;
