//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CurrencyCode;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., lei, not bani).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Price of `quantity` units at this per-unit price, in the same currency.
    ///
    /// Returns `None` if the amount overflows.
    #[must_use]
    pub fn checked_times(&self, quantity: Decimal) -> Option<Self> {
        self.amount
            .checked_mul(quantity)
            .map(|amount| Self::new(amount, self.currency_code))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency_code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_keeps_currency() {
        let per_kg = Price::new(Decimal::new(350, 2), CurrencyCode::EUR);
        let total = per_kg.checked_times(Decimal::new(2, 0)).unwrap();
        assert_eq!(total.amount, Decimal::new(700, 2));
        assert_eq!(total.currency_code, CurrencyCode::EUR);
    }

    #[test]
    fn test_times_overflow_is_none() {
        let price = Price::new(Decimal::MAX, CurrencyCode::RON);
        assert!(price.checked_times(Decimal::new(2, 0)).is_none());
    }

    #[test]
    fn test_display() {
        let price = Price::new(Decimal::new(1005, 2), CurrencyCode::RON);
        assert_eq!(price.to_string(), "10.05 RON");
    }

    #[test]
    fn test_serde_amount_as_string() {
        let price = Price::new(Decimal::new(4, 0), CurrencyCode::USD);
        let json = serde_json::to_value(price).unwrap();
        assert_eq!(json["amount"], "4");
        assert_eq!(json["currency_code"], "USD");
    }
}
