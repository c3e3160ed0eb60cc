//! # Checkout Settings
//!
//! Restaurant-level charge settings, loaded from `config/checkout.toml`.
//!
//! ```toml
//! currency = "aud"
//! minimum_charge = 50
//!
//! [surcharge]
//! card = 1.5
//! direct_debit = 0.5
//! ```

use crate::error::{PaymentError, PaymentResult};
use crate::money::Currency;
use crate::surcharge::SurchargeRates;
use serde::{Deserialize, Serialize};

/// Processor minimum chargeable amount, in minor units
pub const DEFAULT_MINIMUM_CHARGE: i64 = 50;

/// Charge settings shared by the intent manager and the browser estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Currency every charge is opened in
    #[serde(default)]
    pub currency: Currency,

    /// Smallest total the processor accepts
    #[serde(default = "default_minimum_charge")]
    pub minimum_charge: i64,

    /// Per-method surcharge table
    #[serde(default)]
    pub surcharge: SurchargeRates,
}

fn default_minimum_charge() -> i64 {
    DEFAULT_MINIMUM_CHARGE
}

impl CheckoutSettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> PaymentResult<Self> {
        let settings: CheckoutSettings = toml::from_str(content)
            .map_err(|e| PaymentError::Configuration(format!("Invalid checkout settings: {}", e)))?;
        if settings.minimum_charge < 0 {
            return Err(PaymentError::Configuration(
                "minimum_charge must not be negative".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Load the first settings file found, or defaults when none exists
    pub fn load(paths: &[&str]) -> PaymentResult<Self> {
        for path in paths {
            if let Ok(content) = std::fs::read_to_string(path) {
                let settings = Self::from_toml_str(&content)?;
                tracing::info!("Loaded checkout settings from {}", path);
                return Ok(settings);
            }
        }
        tracing::warn!("No checkout settings found, using defaults");
        Ok(Self::default())
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: Currency::AUD,
            minimum_charge: DEFAULT_MINIMUM_CHARGE,
            surcharge: SurchargeRates::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surcharge::{BasisPoints, MethodKind};

    #[test]
    fn test_parse_full_settings() {
        let settings = CheckoutSettings::from_toml_str(
            r#"
            currency = "nzd"
            minimum_charge = 100

            [surcharge]
            card = 2.0
            direct_debit = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(settings.currency, Currency::NZD);
        assert_eq!(settings.minimum_charge, 100);
        assert_eq!(settings.surcharge.rate(MethodKind::Card), BasisPoints::new(200));
        assert_eq!(settings.surcharge.rate(MethodKind::DirectDebit), BasisPoints::new(25));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = CheckoutSettings::from_toml_str("").unwrap();
        assert_eq!(settings, CheckoutSettings::default());
    }

    #[test]
    fn test_missing_files_fall_back() {
        let settings = CheckoutSettings::load(&["/nonexistent/checkout.toml"]).unwrap();
        assert_eq!(settings.minimum_charge, DEFAULT_MINIMUM_CHARGE);
    }

    #[test]
    fn test_rejects_negative_minimum() {
        assert!(CheckoutSettings::from_toml_str("minimum_charge = -1").is_err());
    }
}
