//! # Surcharge Calculator
//!
//! Payment-method surcharges applied on top of the base amount.
//!
//! Rates are held in basis points so every calculation stays in integer
//! minor units. The same functions back the browser estimate (`checkout-wasm`)
//! and the server-authoritative path, so both always agree to the cent.
//!
//! | Method | Rate |
//! |--------|------|
//! | `card` | 1.5 % |
//! | `direct_debit` | 0.5 % |

use crate::error::PaymentError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Payment method kinds that carry a surcharge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Credit/debit card
    Card,
    /// Bank direct debit (BECS in Australia)
    #[serde(alias = "au_becs_debit")]
    DirectDebit,
}

impl MethodKind {
    /// Every supported method, in display order
    pub const ALL: [MethodKind; 2] = [MethodKind::Card, MethodKind::DirectDebit];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Card => "card",
            MethodKind::DirectDebit => "direct_debit",
        }
    }

    /// Human-readable label for receipts
    pub fn label(&self) -> &'static str {
        match self {
            MethodKind::Card => "Credit/Debit Card",
            MethodKind::DirectDebit => "BECS Direct Debit",
        }
    }
}

impl FromStr for MethodKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "card" => Ok(MethodKind::Card),
            "direct_debit" | "au_becs_debit" => Ok(MethodKind::DirectDebit),
            other => Err(PaymentError::UnknownMethodKind {
                kind: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A percentage rate expressed in hundredths of a percent (150 = 1.5 %)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    /// Convert a percentage such as `1.5`. Rejects negatives, NaN and rates above 100 %.
    pub fn from_percent(percent: f64) -> Option<Self> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return None;
        }
        Some(Self((percent * 100.0).round() as u32))
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Apply the rate to an amount in minor units, rounding half up.
    pub fn apply(&self, amount: i64) -> i64 {
        let amount = amount.max(0) as i128;
        ((amount * self.0 as i128 + 5_000) / 10_000) as i64
    }
}

impl Serialize for BasisPoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_percent())
    }
}

impl<'de> Deserialize<'de> for BasisPoints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let percent = f64::deserialize(deserializer)?;
        BasisPoints::from_percent(percent).ok_or_else(|| {
            serde::de::Error::custom(format!("surcharge rate out of range: {}", percent))
        })
    }
}

/// Surcharge rate for each payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeRates {
    pub card: BasisPoints,
    #[serde(alias = "au_becs_debit")]
    pub direct_debit: BasisPoints,
}

impl SurchargeRates {
    pub const fn new(card: BasisPoints, direct_debit: BasisPoints) -> Self {
        Self { card, direct_debit }
    }

    /// Rate for a method kind
    pub fn rate(&self, kind: MethodKind) -> BasisPoints {
        match kind {
            MethodKind::Card => self.card,
            MethodKind::DirectDebit => self.direct_debit,
        }
    }

    /// Highest rate across all supported methods
    pub fn max_rate(&self) -> BasisPoints {
        MethodKind::ALL
            .iter()
            .map(|kind| self.rate(*kind))
            .max()
            .unwrap_or_default()
    }

    /// Surcharge in minor units for `amount` paid with `kind`
    pub fn surcharge(&self, amount: i64, kind: MethodKind) -> i64 {
        self.rate(kind).apply(amount)
    }

    /// `amount + surcharge(amount, kind)`
    pub fn total_with_surcharge(&self, amount: i64, kind: MethodKind) -> i64 {
        amount.saturating_add(self.surcharge(amount, kind))
    }

    /// Worst-case total used for the provisional charge
    pub fn provisional_total(&self, amount: i64) -> i64 {
        amount.saturating_add(self.max_rate().apply(amount))
    }

    /// Rates as `{method: percent}` for clients
    pub fn as_percentages(&self) -> BTreeMap<&'static str, f64> {
        MethodKind::ALL
            .iter()
            .map(|kind| (kind.as_str(), self.rate(*kind).as_percent()))
            .collect()
    }
}

impl Default for SurchargeRates {
    fn default() -> Self {
        Self::new(BasisPoints::new(150), BasisPoints::new(50))
    }
}

/// Surcharge and total for one amount/method pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeQuote {
    pub method: MethodKind,
    pub base_amount: i64,
    pub surcharge: i64,
    pub total: i64,
}

impl SurchargeQuote {
    pub fn new(rates: &SurchargeRates, base_amount: i64, method: MethodKind) -> Self {
        let surcharge = rates.surcharge(base_amount, method);
        Self {
            method,
            base_amount,
            surcharge,
            total: base_amount + surcharge,
        }
    }
}
