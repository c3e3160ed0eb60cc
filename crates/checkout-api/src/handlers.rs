//! # Request Handlers
//!
//! Axum request handlers for the checkout API.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use checkout_core::{
    Acknowledgement, Invoice, MethodKind, NewOrder, OrderItem, OrderItemSide, PaymentError,
    PaymentStatus, PickupKind, Revision,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create payment intent response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Pre-surcharge amount, minor units
    pub base_amount: i64,
    /// Amount the charge was opened at, minor units
    pub provisional_amount: i64,
    pub currency: String,
    /// Percent per method kind, e.g. `{"card": 1.5}`
    pub surcharge_rates: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAmountRequest {
    #[serde(default)]
    pub payment_intent_id: String,
    #[serde(default)]
    pub payment_method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateAmountResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surcharge: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: String,
}

impl From<Revision> for UpdateAmountResponse {
    fn from(revision: Revision) -> Self {
        match revision {
            Revision::Applied {
                amount,
                surcharge,
                status,
            } => Self {
                success: true,
                amount: Some(amount),
                surcharge: Some(surcharge),
                message: None,
                status: status.to_string(),
            },
            Revision::NotRevisable { status } => Self {
                success: true,
                amount: None,
                surcharge: None,
                message: Some(format!("Payment is {}. Amount update not needed.", status)),
                status: status.to_string(),
            },
        }
    }
}

/// Save order request: amounts in minor units
#[derive(Debug, Deserialize)]
pub struct SaveOrderRequest {
    pub order: SaveOrderFields,
    pub items: Vec<SaveOrderItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SaveOrderFields {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub note: Option<String>,
    pub pickup_type: String,
    pub datetime: String,
    pub subtotal: i64,
    pub total: i64,
    pub surcharge_amount: i64,
    pub payment_method: Option<String>,
    pub stripe_payment_id: String,
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveOrderItem {
    pub dish_id: serde_json::Value,
    pub dish_name: String,
    pub dish_price: i64,
    pub quantity: u32,
    #[serde(default)]
    pub sides: Vec<SaveOrderSide>,
}

#[derive(Debug, Deserialize)]
pub struct SaveOrderSide {
    pub side_name: String,
    pub side_price: i64,
}

impl SaveOrderRequest {
    fn into_order(self) -> Result<(NewOrder, Vec<OrderItem>), PaymentError> {
        let fields = self.order;
        let pickup_type = PickupKind::parse(&fields.pickup_type).ok_or_else(|| {
            PaymentError::InvalidOrderData("missing field in order: pickup_type".to_string())
        })?;
        let payment_method = match fields.payment_method.as_deref() {
            Some(kind) => kind.parse::<MethodKind>()?,
            None => MethodKind::Card,
        };
        let payment_status = match fields.payment_status.as_deref() {
            Some("failed") => PaymentStatus::Failed,
            _ => PaymentStatus::Succeeded,
        };

        let items = self
            .items
            .into_iter()
            .map(|item| {
                let dish_id = match item.dish_id {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => {
                        return Err(PaymentError::InvalidOrderData(
                            "Invalid item structure in items array".to_string(),
                        ))
                    }
                };
                Ok(OrderItem {
                    dish_id,
                    name: item.dish_name,
                    unit_price: item.dish_price,
                    quantity: item.quantity,
                    sides: item
                        .sides
                        .into_iter()
                        .map(|side| OrderItemSide {
                            name: side.side_name,
                            price: side.side_price,
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = NewOrder {
            name: fields.name,
            phone: fields.phone,
            email: fields.email,
            note: fields.note,
            pickup_type,
            datetime: fields.datetime,
            subtotal: fields.subtotal,
            total: fields.total,
            surcharge_amount: fields.surcharge_amount,
            payment_method,
            charge_id: fields.stripe_payment_id,
            payment_status,
        };
        Ok((order, items))
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Render a `PaymentError`; server-side failures keep their details in the log only
pub fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.kind(), code);
    if code < 500 {
        response = response.with_details(err.to_string());
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn rejected_body(rejection: JsonRejection, as_error: fn(String) -> PaymentError) -> ApiError {
    warn!("Rejected request body: {}", rejection.body_text());
    payment_error_to_response(as_error(rejection.body_text()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "quan-checkout",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Open a provisional charge at the worst-case surcharge
#[instrument(skip(state, payload))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    payload: Result<Json<Invoice>, JsonRejection>,
) -> Result<Json<CreatePaymentIntentResponse>, ApiError> {
    let Json(invoice) = payload.map_err(|r| rejected_body(r, PaymentError::Validation))?;

    let opened = state
        .manager
        .open_provisional_charge(&invoice)
        .await
        .map_err(|e| {
            error!("Failed to open payment intent: {}", e);
            payment_error_to_response(e)
        })?;

    Ok(Json(CreatePaymentIntentResponse {
        client_secret: opened.client_secret,
        payment_intent_id: opened.charge_id,
        base_amount: opened.base_amount,
        provisional_amount: opened.provisional_amount,
        currency: opened.currency.as_str().to_string(),
        surcharge_rates: opened.rates.as_percentages(),
    }))
}

/// Re-price a charge for the selected payment method
#[instrument(skip(state, payload))]
pub async fn update_payment_intent_amount(
    State(state): State<AppState>,
    payload: Result<Json<UpdateAmountRequest>, JsonRejection>,
) -> Result<Json<UpdateAmountResponse>, ApiError> {
    let Json(request) = payload.map_err(|r| rejected_body(r, PaymentError::Validation))?;

    let method: MethodKind = request
        .payment_method
        .parse()
        .map_err(payment_error_to_response)?;

    let revision = state
        .manager
        .revise_charge_amount(&request.payment_intent_id, method)
        .await
        .map_err(|e| {
            error!("Error updating payment intent: {}", e);
            payment_error_to_response(e)
        })?;

    Ok(Json(revision.into()))
}

/// Static surcharge table in percent
pub async fn surcharge_rates(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.rates().as_percentages())
}

/// Handle a signed Stripe webhook. Anything past signature verification is acknowledged.
#[instrument(skip(state, headers, body))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("SignatureVerificationFailed", 400)
                    .with_details("Missing Stripe-Signature header")),
            )
        })?;

    let ack = state.reconciler.handle(&body, signature).await.map_err(|e| {
        error!("Webhook verification failed: {}", e);
        payment_error_to_response(e)
    })?;

    let outcome = match &ack {
        Acknowledgement::OrderCreated { .. } => "order_created",
        Acknowledgement::Duplicate { .. } => "duplicate",
        Acknowledgement::FailureNoticed => "failure_noticed",
        Acknowledgement::Skipped { .. } => "skipped",
        Acknowledgement::Ignored { .. } => "ignored",
        Acknowledgement::Failed { .. } => "failed",
    };
    info!(outcome, "Webhook acknowledged");

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Validate and persist an order posted by a trusted caller
#[instrument(skip(state, payload))]
pub async fn save_order(
    State(state): State<AppState>,
    payload: Result<Json<SaveOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|r| rejected_body(r, PaymentError::InvalidOrderData))?;
    let (order, items) = request.into_order().map_err(payment_error_to_response)?;

    let created = state
        .store
        .create_order_once(&order, &items)
        .await
        .map_err(|e| {
            error!("Error creating order: {}", e);
            payment_error_to_response(e)
        })?;

    info!(order_id = created.order_id(), new = created.is_new(), "Order saved via API");
    Ok(Json(serde_json::json!({
        "success": true,
        "orderId": created.order_id()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::ChargeStatus;

    #[test]
    fn test_error_response_hides_server_details() {
        let (status, Json(body)) =
            payment_error_to_response(PaymentError::PersistenceFailed("disk full".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "PersistenceFailed");
        assert!(body.details.is_none());

        let (status, Json(body)) = payment_error_to_response(PaymentError::OrderTooSmall {
            amount: 40,
            minimum: 50,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "OrderTooSmall");
        assert!(body.details.unwrap().contains("minimum of 50"));
    }

    #[test]
    fn test_not_revisable_response_message() {
        let response: UpdateAmountResponse = Revision::NotRevisable {
            status: ChargeStatus::Succeeded,
        }
        .into();
        assert!(response.success);
        assert_eq!(response.status, "succeeded");
        assert_eq!(
            response.message.as_deref(),
            Some("Payment is succeeded. Amount update not needed.")
        );
        assert!(response.amount.is_none());
    }

    #[test]
    fn test_save_order_request_conversion() {
        let request: SaveOrderRequest = serde_json::from_value(serde_json::json!({
            "order": {
                "name": "Linh",
                "phone": "0400 000 000",
                "pickup_type": "reservation",
                "datetime": "2026-10-18 19:00",
                "subtotal": 1800,
                "total": 1809,
                "surcharge_amount": 9,
                "payment_method": "au_becs_debit",
                "stripe_payment_id": "pi_1"
            },
            "items": [
                {"dish_id": 3, "dish_name": "Pho Bo", "dish_price": 1800, "quantity": 1,
                 "sides": [{"side_name": "Extra meats", "side_price": 0}]}
            ]
        }))
        .unwrap();

        let (order, items) = request.into_order().unwrap();
        assert_eq!(order.pickup_type, PickupKind::Reservation);
        assert_eq!(order.payment_method, MethodKind::DirectDebit);
        assert_eq!(order.payment_status, PaymentStatus::Succeeded);
        assert_eq!(items[0].dish_id, "3");
        assert_eq!(items[0].sides[0].name, "Extra meats");
    }

    #[test]
    fn test_save_order_rejects_unknown_method() {
        let request: SaveOrderRequest = serde_json::from_value(serde_json::json!({
            "order": {"pickup_type": "pickup", "payment_method": "bitcoin"},
            "items": []
        }))
        .unwrap();
        assert!(matches!(
            request.into_order(),
            Err(PaymentError::UnknownMethodKind { .. })
        ));
    }
}
