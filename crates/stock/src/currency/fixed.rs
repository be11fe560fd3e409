//! A rate source backed by a fixed table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;

use pantry_core::CurrencyCode;

use super::{CurrencyError, RateSource};

/// Rates from an in-memory table, used for offline snapshots.
///
/// Counts lookups and can be switched to failing, which makes it the fake
/// collaborator for cache and costing tests as well.
#[derive(Debug, Default)]
pub struct StaticRateSource {
    rates: RwLock<HashMap<CurrencyCode, Decimal>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl StaticRateSource {
    #[must_use]
    pub fn new(rates: impl IntoIterator<Item = (CurrencyCode, Decimal)>) -> Self {
        Self {
            rates: RwLock::new(rates.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A source that knows no currencies.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, currency: CurrencyCode, rate: Decimal) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency, rate);
    }

    /// Make every lookup fail as if the source were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups served so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn exchange_rate(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CurrencyError::SourceUnavailable {
                currency,
                reason: "rate table offline".to_string(),
            });
        }

        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&currency)
            .copied()
            .ok_or(CurrencyError::UnknownCurrency(currency))
    }
}
