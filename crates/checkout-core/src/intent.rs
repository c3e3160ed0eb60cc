//! # Payment Intent Manager
//!
//! Opens a provisional charge before the customer has picked a payment method,
//! then revises the amount in place as the selection changes.
//!
//! ```text
//! invoice ──► base amount ──► charge at base + max-rate surcharge
//!                                   │
//!           method selected ──► retrieve ──► revisable? ──► update amount + final_* metadata
//!                                                  │
//!                                                  └──► no: report status, change nothing
//! ```
//!
//! The provisional amount is the worst case, so a revision only ever lowers
//! it or leaves it unchanged.

use crate::charge::{
    ChargeMetadata, ChargeStatus, ChargeUpdate, NewCharge, ProvisionalContext,
};
use crate::error::{PaymentError, PaymentResult};
use crate::invoice::Invoice;
use crate::locks::KeyedLocks;
use crate::money::Currency;
use crate::order::MAX_CHARGE_AMOUNT;
use crate::processor::BoxedChargeProcessor;
use crate::settings::CheckoutSettings;
use crate::surcharge::{MethodKind, SurchargeQuote, SurchargeRates};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A freshly opened charge, as returned to the browser
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionalCharge {
    pub charge_id: String,
    pub client_secret: String,
    /// Pre-surcharge amount, minor units
    pub base_amount: i64,
    /// Amount the charge was opened at (base + max surcharge)
    pub provisional_amount: i64,
    pub currency: Currency,
    pub rates: SurchargeRates,
}

/// Outcome of a revision request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// Amount and `final_*` metadata were written
    Applied {
        amount: i64,
        surcharge: i64,
        status: ChargeStatus,
    },
    /// The charge had already left the revisable states; nothing changed
    NotRevisable { status: ChargeStatus },
}

impl Revision {
    pub fn status(&self) -> &ChargeStatus {
        match self {
            Revision::Applied { status, .. } | Revision::NotRevisable { status } => status,
        }
    }
}

pub struct PaymentIntentManager {
    processor: BoxedChargeProcessor,
    settings: CheckoutSettings,
    locks: KeyedLocks,
}

impl PaymentIntentManager {
    pub fn new(processor: BoxedChargeProcessor, settings: CheckoutSettings) -> Self {
        Self {
            processor,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn rates(&self) -> &SurchargeRates {
        &self.settings.surcharge
    }

    /// Open a charge at the worst-case surcharge for `invoice`.
    ///
    /// The base amount is recomputed from item prices; client totals are ignored.
    #[instrument(skip(self, invoice), fields(items = invoice.items.len()))]
    pub async fn open_provisional_charge(
        &self,
        invoice: &Invoice,
    ) -> PaymentResult<ProvisionalCharge> {
        let currency = self.settings.currency;
        let details = &invoice.details;
        if details.name.trim().is_empty() {
            return Err(PaymentError::Validation("Customer name is required".to_string()));
        }
        if details.phone.trim().is_empty() {
            return Err(PaymentError::Validation("Customer phone is required".to_string()));
        }

        let (items, base_amount) = invoice.priced_items(currency)?;
        let provisional_amount = self.settings.surcharge.provisional_total(base_amount);
        if provisional_amount > MAX_CHARGE_AMOUNT {
            return Err(PaymentError::Validation(format!(
                "Order total {} exceeds the maximum charge of {} minor units",
                provisional_amount, MAX_CHARGE_AMOUNT
            )));
        }
        if provisional_amount < self.settings.minimum_charge {
            return Err(PaymentError::OrderTooSmall {
                amount: provisional_amount,
                minimum: self.settings.minimum_charge,
            });
        }

        let metadata = ChargeMetadata::provisional(
            ProvisionalContext {
                name: &details.name,
                phone: &details.phone,
                email: invoice.email(),
                note: details.note.as_deref(),
                pickup: invoice.pickup_kind(),
                datetime: &details.datetime,
            },
            &items,
            base_amount,
            currency,
            &self.settings.surcharge,
        )?;

        let charge = self
            .processor
            .create_charge(NewCharge {
                amount: provisional_amount,
                currency,
                receipt_email: invoice.email().map(String::from),
                metadata,
                idempotency_key: format!("checkout-{}", Uuid::new_v4()),
            })
            .await?;

        let client_secret = charge.client_secret.ok_or_else(|| PaymentError::ProviderError {
            provider: self.processor.provider_name().to_string(),
            message: "Charge was created without a client secret".to_string(),
        })?;

        info!(
            charge_id = %charge.id,
            base_amount,
            provisional_amount,
            "Opened provisional charge"
        );

        Ok(ProvisionalCharge {
            charge_id: charge.id,
            client_secret,
            base_amount,
            provisional_amount,
            currency,
            rates: self.settings.surcharge,
        })
    }

    /// Re-price a charge for the selected method.
    ///
    /// Revisions for one charge id run one at a time. The amount is derived from
    /// the base amount stored on the charge, never from the caller.
    #[instrument(skip(self), fields(method = %kind))]
    pub async fn revise_charge_amount(
        &self,
        charge_id: &str,
        kind: MethodKind,
    ) -> PaymentResult<Revision> {
        if charge_id.trim().is_empty() {
            return Err(PaymentError::Validation(
                "Payment intent ID is required".to_string(),
            ));
        }
        self.locks
            .run(charge_id, self.revise_locked(charge_id, kind))
            .await
    }

    async fn revise_locked(&self, charge_id: &str, kind: MethodKind) -> PaymentResult<Revision> {
        let charge = self.processor.retrieve_charge(charge_id).await?;
        if !charge.status.is_revisable() {
            info!(status = %charge.status, "Charge no longer revisable, leaving amount as is");
            return Ok(Revision::NotRevisable {
                status: charge.status,
            });
        }

        let base_amount = charge.metadata.base_amount().ok_or_else(|| {
            PaymentError::Validation("Charge is missing its base amount".to_string())
        })?;
        let quote = SurchargeQuote::new(&self.settings.surcharge, base_amount, kind);

        let mut metadata = ChargeMetadata::new();
        metadata.set_final_revision(&quote);

        match self
            .processor
            .update_charge(
                charge_id,
                ChargeUpdate {
                    amount: quote.total,
                    metadata,
                },
            )
            .await
        {
            Ok(updated) => {
                info!(
                    amount = quote.total,
                    surcharge = quote.surcharge,
                    "Revised charge amount"
                );
                Ok(Revision::Applied {
                    amount: quote.total,
                    surcharge: quote.surcharge,
                    status: updated.status,
                })
            }
            Err(PaymentError::ChargeNotRevisable { status }) => {
                warn!(%status, "Charge changed state before the revision landed");
                Ok(Revision::NotRevisable {
                    status: ChargeStatus::parse(&status),
                })
            }
            Err(e) => Err(e),
        }
    }
}
