//! # Money Types
//!
//! Currency and minor-unit helpers shared by invoices, charges and orders.

use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    AUD,
    NZD,
    USD,
    EUR,
    GBP,
    JPY,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::AUD => "aud",
            Currency::NZD => "nzd",
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
        }
    }

    /// Parse a lowercase or uppercase ISO code
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "aud" => Some(Currency::AUD),
            "nzd" => Some(Currency::NZD),
            "usd" => Some(Currency::USD),
            "eur" => Some(Currency::EUR),
            "gbp" => Some(Currency::GBP),
            "jpy" => Some(Currency::JPY),
            _ => None,
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, most others have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }

    fn symbol(&self) -> &'static str {
        match self {
            Currency::AUD => "A$",
            Currency::NZD => "NZ$",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
        }
    }

    /// Decimal string without symbol, e.g. `12.50` (used for display metadata)
    pub fn format_plain(&self, amount: i64) -> String {
        let places = self.decimal_places() as usize;
        if places == 0 {
            amount.to_string()
        } else {
            format!("{:.*}", places, self.from_smallest_unit(amount))
        }
    }

    /// Format for display (e.g., "A$10.15")
    pub fn display(&self, amount: i64) -> String {
        format!("{}{}", self.symbol(), self.format_plain(amount))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::AUD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_smallest_unit() {
        assert_eq!(Currency::AUD.to_smallest_unit(12.5), 1250);
        assert_eq!(Currency::AUD.to_smallest_unit(0.1 + 0.2), 30);
        assert_eq!(Currency::JPY.to_smallest_unit(500.0), 500);
    }

    #[test]
    fn test_display() {
        assert_eq!(Currency::AUD.display(1015), "A$10.15");
        assert_eq!(Currency::AUD.format_plain(1000), "10.00");
        assert_eq!(Currency::JPY.display(500), "¥500");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Currency::parse("AUD"), Some(Currency::AUD));
        assert_eq!(Currency::parse("xyz"), None);
    }
}
