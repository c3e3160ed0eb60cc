//! # checkout-wasm
//!
//! WebAssembly bindings for quan-checkout.
//!
//! This crate provides WASM-compatible functions for:
//! - Surcharge estimates, using the same code path as the server
//! - Cart state and invoice building
//! - The revision debouncer state machine (the page owns the timers)
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { estimate_total, WasmRevisionDebouncer } from 'checkout-wasm';
//!
//! await init();
//!
//! console.log('Card total:', estimate_total(1000, 'card')); // 1015
//!
//! const debouncer = new WasmRevisionDebouncer();
//! debouncer.select('direct_debit', performance.now());
//! // on each timer: const method = debouncer.tick(performance.now());
//! ```
//!
//! ## Building
//!
//! ```bash
//! wasm-pack build --target web
//! ```

use checkout_core::{
    CallOutcome, CheckoutSession, Currency, DebounceConfig, Debouncer, Dispatch, InvoiceItem,
    MethodKind, PickupKind, SurchargeRates,
};
use wasm_bindgen::prelude::*;

const CURRENCY: Currency = Currency::AUD;

fn rates() -> SurchargeRates {
    SurchargeRates::default()
}

fn js_error(message: String) -> JsValue {
    JsValue::from_str(&message)
}

fn parse_method(method: &str) -> Result<MethodKind, String> {
    method.parse::<MethodKind>().map_err(|e| e.to_string())
}

// =============================================================================
// Surcharge estimates
// =============================================================================

/// Surcharge for `base_cents` paid by `method`; unknown methods carry none
#[wasm_bindgen]
pub fn estimate_surcharge(base_cents: i64, method: &str) -> i64 {
    match parse_method(method) {
        Ok(kind) => rates().surcharge(base_cents, kind),
        Err(_) => 0,
    }
}

/// Base plus surcharge for `method`
#[wasm_bindgen]
pub fn estimate_total(base_cents: i64, method: &str) -> i64 {
    base_cents.saturating_add(estimate_surcharge(base_cents, method))
}

/// Amount the charge is opened at before a method is chosen
#[wasm_bindgen]
pub fn provisional_total(base_cents: i64) -> i64 {
    rates().provisional_total(base_cents)
}

/// Surcharge table as `{card: 1.5, direct_debit: 0.5}`
#[wasm_bindgen]
pub fn surcharge_rates() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&rates().as_percentages())
        .map_err(|e| js_error(e.to_string()))
}

/// Format minor units for display, e.g. `A$10.15`
#[wasm_bindgen]
pub fn format_amount(cents: i64) -> String {
    CURRENCY.display(cents)
}

// =============================================================================
// Cart
// =============================================================================

/// Cart lines and customer details, producing the invoice for `/create-payment-intent`
#[wasm_bindgen]
#[derive(Debug, Default)]
pub struct WasmCheckoutSession {
    inner: CheckoutSession,
}

#[wasm_bindgen]
impl WasmCheckoutSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dish given as `{id, name, dishPrice, quantity, sides: [{name, price}]}`
    pub fn add_item(&mut self, item: JsValue) -> Result<(), JsValue> {
        let item: InvoiceItem = serde_wasm_bindgen::from_value(item)
            .map_err(|e| js_error(format!("Invalid cart item: {}", e)))?;
        self.inner.add_item(item);
        Ok(())
    }

    /// Add a dish from its JSON text
    pub fn add_item_json(&mut self, item: &str) -> Result<(), JsValue> {
        self.add_item_str(item).map_err(js_error)
    }

    /// Zero removes the line
    pub fn set_quantity(&mut self, index: usize, quantity: u32) {
        self.inner.set_quantity(index, quantity);
    }

    pub fn set_customer(&mut self, name: String, phone: String, email: Option<String>) {
        let email = email.filter(|e| !e.trim().is_empty());
        self.inner = std::mem::take(&mut self.inner).with_customer(name, phone, email);
    }

    /// `pickup` or `reservation`
    pub fn set_pickup(&mut self, kind: &str, datetime: String) -> Result<(), JsValue> {
        self.set_pickup_str(kind, datetime).map_err(js_error)
    }

    pub fn set_note(&mut self, note: String) {
        self.inner = std::mem::take(&mut self.inner).with_note(note);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.inner.item_count()
    }

    /// Pre-surcharge total in minor units
    pub fn subtotal_cents(&self) -> Result<i64, JsValue> {
        self.inner
            .subtotal(CURRENCY)
            .map_err(|e| js_error(e.to_string()))
    }

    /// Request body for `/create-payment-intent`
    pub fn invoice_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.to_invoice()).map_err(|e| js_error(e.to_string()))
    }

    /// Forget cart and customer after the order is placed
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl WasmCheckoutSession {
    fn add_item_str(&mut self, item: &str) -> Result<(), String> {
        let item: InvoiceItem =
            serde_json::from_str(item).map_err(|e| format!("Invalid cart item: {}", e))?;
        self.inner.add_item(item);
        Ok(())
    }

    fn set_pickup_str(&mut self, kind: &str, datetime: String) -> Result<(), String> {
        let pickup = PickupKind::parse(kind).ok_or_else(|| format!("Unknown pickup type: {}", kind))?;
        self.inner = std::mem::take(&mut self.inner).with_pickup(pickup, datetime);
        Ok(())
    }
}

// =============================================================================
// Revision debouncer
// =============================================================================

/// Method-change debouncer driven by the page's clock.
///
/// Every call takes `now_ms` (e.g. `performance.now()`). A returned method
/// name means "send the revision request for this method now"; report how it
/// went with `complete`. Schedule the next `tick` at `next_deadline()`.
#[wasm_bindgen]
#[derive(Debug, Default)]
pub struct WasmRevisionDebouncer {
    inner: Debouncer,
}

#[wasm_bindgen]
impl WasmRevisionDebouncer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Debouncer with a custom quiet window (milliseconds)
    pub fn with_window(window_ms: u32) -> Self {
        Self {
            inner: Debouncer::new(DebounceConfig {
                window_ms: window_ms as u64,
                ..DebounceConfig::default()
            }),
        }
    }

    pub fn select(&mut self, method: &str, now_ms: f64) -> Result<(), JsValue> {
        let kind = parse_method(method).map_err(js_error)?;
        self.inner.select(kind, clock(now_ms));
        Ok(())
    }

    pub fn tick(&mut self, now_ms: f64) -> Option<String> {
        dispatched(self.inner.tick(clock(now_ms)))
    }

    /// Send anything still waiting on a timer (call before confirming payment)
    pub fn flush(&mut self) -> Option<String> {
        dispatched(self.inner.flush())
    }

    /// `applied`, `not_revisable`, `transient` or `failed`
    pub fn complete(&mut self, outcome: &str, now_ms: f64) -> Result<Option<String>, JsValue> {
        let outcome = parse_outcome(outcome).map_err(js_error)?;
        Ok(dispatched(self.inner.complete(outcome, clock(now_ms))))
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.inner.next_deadline().map(|ms| ms as f64)
    }

    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    pub fn last_applied(&self) -> Option<String> {
        self.inner.last_applied().map(|m| m.as_str().to_string())
    }

    pub fn last_failed(&self) -> Option<String> {
        self.inner.last_failed().map(|m| m.as_str().to_string())
    }

    /// Current state as JSON, e.g. `{"state":"pending","method":"card","deadline":800}`
    pub fn state_json(&self) -> String {
        serde_json::to_string(&self.inner.state()).unwrap_or_default()
    }
}

/// Map a `/api/update-payment-intent-amount` reply to a `complete` outcome
#[wasm_bindgen]
pub fn classify_response(http_status: u16, amount_changed: bool) -> String {
    let outcome = match http_status {
        200..=299 if amount_changed => "applied",
        200..=299 => "not_revisable",
        409 | 429 => "transient",
        _ => "failed",
    };
    outcome.to_string()
}

fn parse_outcome(outcome: &str) -> Result<CallOutcome, String> {
    match outcome {
        "applied" => Ok(CallOutcome::Applied),
        "not_revisable" => Ok(CallOutcome::NotRevisable),
        "transient" => Ok(CallOutcome::Transient),
        "failed" => Ok(CallOutcome::Failed),
        other => Err(format!("Unknown call outcome: {}", other)),
    }
}

fn clock(now_ms: f64) -> u64 {
    if now_ms.is_finite() && now_ms > 0.0 {
        now_ms as u64
    } else {
        0
    }
}

fn dispatched(dispatch: Option<Dispatch>) -> Option<String> {
    dispatch.map(|d| d.method.as_str().to_string())
}

/// Log to browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Get library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimates_match_server_rates() {
        assert_eq!(estimate_surcharge(1000, "card"), 15);
        assert_eq!(estimate_total(1000, "direct_debit"), 1005);
        assert_eq!(estimate_total(1000, "au_becs_debit"), 1005);
        assert_eq!(provisional_total(1000), 1015);
    }

    #[test]
    fn test_unknown_method_has_no_surcharge() {
        assert_eq!(estimate_surcharge(1000, "paypal"), 0);
        assert_eq!(estimate_total(1000, "paypal"), 1000);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1015), "A$10.15");
    }

    #[test]
    fn test_session_builds_invoice() {
        let mut session = WasmCheckoutSession::new();
        session
            .add_item_str(r#"{"id": 3, "name": "Pho Bo", "dishPrice": 18.0, "quantity": 1}"#)
            .unwrap();
        session
            .add_item_str(r#"{"id": 3, "name": "Pho Bo", "dishPrice": 18.0, "quantity": 1}"#)
            .unwrap();
        session.set_customer("Linh".to_string(), "0400".to_string(), Some(" ".to_string()));
        session
            .set_pickup_str("reservation", "2026-10-18 19:00".to_string())
            .unwrap();

        assert_eq!(session.item_count(), 2);
        assert_eq!(session.inner.subtotal(CURRENCY).unwrap(), 3600);

        let invoice: serde_json::Value =
            serde_json::from_str(&session.invoice_json().unwrap()).unwrap();
        assert_eq!(invoice["order"]["name"], "Linh");
        assert_eq!(invoice["order"]["pickup_type"], "reservation");
        assert!(invoice["order"].get("email").is_none());

        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.inner.customer.name, "");
    }

    #[test]
    fn test_debouncer_coalesces_toggles() {
        let mut debouncer = WasmRevisionDebouncer::new();
        debouncer.inner.select(MethodKind::DirectDebit, 0);
        debouncer.inner.select(MethodKind::Card, 300);
        debouncer.inner.select(MethodKind::DirectDebit, 600);

        assert_eq!(debouncer.tick(1000.0), None);
        assert_eq!(debouncer.next_deadline(), Some(1400.0));
        assert_eq!(debouncer.tick(1400.0).as_deref(), Some("direct_debit"));
        assert!(debouncer.state_json().contains("in_flight"));

        let outcome = parse_outcome(&classify_response(200, true)).unwrap();
        assert_eq!(debouncer.inner.complete(outcome, 1500), None);
        assert_eq!(debouncer.last_applied().as_deref(), Some("direct_debit"));
        assert!(debouncer.is_idle());
    }

    #[test]
    fn test_flush_sends_pending_immediately() {
        let mut debouncer = WasmRevisionDebouncer::with_window(800);
        debouncer.inner.select(MethodKind::Card, 0);
        assert_eq!(debouncer.flush().as_deref(), Some("card"));
        assert_eq!(debouncer.flush(), None);
    }

    #[test]
    fn test_classify_response() {
        assert_eq!(classify_response(200, false), "not_revisable");
        assert_eq!(classify_response(429, false), "transient");
        assert_eq!(classify_response(409, false), "transient");
        assert_eq!(classify_response(500, false), "failed");
        assert!(parse_outcome("maybe").is_err());
    }
}
