//! Conversion of purchase prices to the base currency (RON).
//!
//! # Architecture
//!
//! - [`RateSource`] - Where exchange rates come from (HTTP feed, fixed table)
//! - [`RateCache`] - Owns freshness and background refresh of fetched rates
//! - [`CurrencyNormalizer`] - The handle the costing engine converts through
//!
//! A rate is the amount of RON one unit of the foreign currency buys. RON
//! itself never reaches a rate source.

pub mod cache;
pub mod fixed;
pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use pantry_core::CurrencyCode;

pub use cache::RateCache;
pub use fixed::StaticRateSource;
pub use http::HttpRateSource;

/// Errors raised while resolving an exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    /// The rate source could not be reached or answered with an error.
    #[error("exchange rate for {currency} unavailable: {reason}")]
    SourceUnavailable {
        currency: CurrencyCode,
        reason: String,
    },

    /// The rate source does not publish this currency.
    #[error("no exchange rate published for {0}")]
    UnknownCurrency(CurrencyCode),

    /// The rate source returned a rate that cannot be used.
    #[error("invalid exchange rate {rate} for {currency}")]
    InvalidRate {
        currency: CurrencyCode,
        rate: Decimal,
    },

    /// The rate feed quotes against a currency other than RON. Retrying
    /// cannot fix this; the feed URL is wrong.
    #[error("rate feed for {currency} is based on {base}, expected RON")]
    ForeignBase {
        currency: CurrencyCode,
        base: CurrencyCode,
    },

    /// The converted amount does not fit in a decimal.
    #[error("{amount} {currency} overflows when converted to RON")]
    Overflow {
        currency: CurrencyCode,
        amount: Decimal,
    },
}

impl CurrencyError {
    /// Whether retrying the lookup may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

/// A provider of exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// RON per one unit of `currency`.
    async fn exchange_rate(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError>;
}

/// Converts amounts to RON through a shared [`RateCache`].
///
/// Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct CurrencyNormalizer {
    rates: RateCache,
}

impl CurrencyNormalizer {
    #[must_use]
    pub const fn new(rates: RateCache) -> Self {
        Self { rates }
    }

    /// RON per one unit of `currency`. RON resolves to `1` without a lookup.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError` if the rate cannot be resolved.
    pub async fn rate_for(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        if currency.is_base() {
            return Ok(Decimal::ONE);
        }
        self.rates.get(currency).await
    }

    /// Convert `amount` in `currency` to RON.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError` if the rate cannot be resolved. There is no
    /// fallback rate.
    pub async fn to_base_currency(
        &self,
        amount: Decimal,
        currency: CurrencyCode,
    ) -> Result<Decimal, CurrencyError> {
        if currency.is_base() {
            return Ok(amount);
        }
        amount
            .checked_mul(self.rate_for(currency).await?)
            .ok_or(CurrencyError::Overflow { currency, amount })
    }
}

impl std::fmt::Debug for CurrencyNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyNormalizer").finish_non_exhaustive()
    }
}
