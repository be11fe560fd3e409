//! Exchange-rate cache with a freshness window and background refresh.
//!
//! Fresh rates live in a `moka` cache for the configured TTL. Every rate ever
//! fetched is also kept as the last-known value, so once a rate has expired a
//! reader gets the last-known value immediately while a refresh runs in the
//! background. Only a currency that was never fetched makes the caller wait.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use pantry_core::CurrencyCode;

use super::{CurrencyError, RateSource};
use crate::retry::{RetryPolicy, with_retry};

/// Default freshness window for fetched rates.
pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(300);

/// Cache of exchange rates in front of a [`RateSource`].
///
/// Construct once per process and clone the handle; clones share state.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<RateCacheInner>,
}

struct RateCacheInner {
    source: Arc<dyn RateSource>,
    fresh: Cache<CurrencyCode, Decimal>,
    last_known: RwLock<HashMap<CurrencyCode, Decimal>>,
    refreshing: Mutex<HashSet<CurrencyCode>>,
    retry: RetryPolicy,
}

impl RateCache {
    /// A cache with the default TTL and retry policy.
    #[must_use]
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self::with_options(source, DEFAULT_RATE_TTL, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_options(source: Arc<dyn RateSource>, ttl: Duration, retry: RetryPolicy) -> Self {
        let fresh = Cache::builder()
            .max_capacity(256)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(RateCacheInner {
                source,
                fresh,
                last_known: RwLock::new(HashMap::new()),
                refreshing: Mutex::new(HashSet::new()),
                retry,
            }),
        }
    }

    /// Resolve the rate for `currency`.
    ///
    /// Never waits on a refresh when a last-known rate exists.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError` if the currency was never fetched and the
    /// source fails after retries.
    #[instrument(skip(self))]
    pub async fn get(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        if let Some(rate) = self.inner.fresh.get(&currency).await {
            return Ok(rate);
        }

        if let Some(rate) = self.last_known(currency) {
            debug!(%currency, %rate, "Serving last-known rate while refreshing");
            self.spawn_refresh(currency);
            return Ok(rate);
        }

        self.fetch(currency).await
    }

    /// The last rate fetched for `currency`, fresh or not.
    #[must_use]
    pub fn last_known(&self, currency: CurrencyCode) -> Option<Decimal> {
        self.inner
            .last_known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&currency)
            .copied()
    }

    /// Currencies fetched at least once.
    #[must_use]
    pub fn known_currencies(&self) -> Vec<CurrencyCode> {
        self.inner
            .last_known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Re-fetch every known currency. Returns how many refreshed.
    ///
    /// Failures keep the last-known rate and are logged.
    pub async fn refresh_all(&self) -> usize {
        let mut refreshed = 0;
        for currency in self.known_currencies() {
            match self.fetch(currency).await {
                Ok(_) => refreshed += 1,
                Err(err) => warn!(
                    %currency,
                    error = %err,
                    "Rate refresh failed, keeping last-known rate"
                ),
            }
        }
        refreshed
    }

    /// Refresh every known currency on a fixed interval until the handle is
    /// aborted.
    #[must_use]
    pub fn spawn_refresher(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        info!(interval_secs = interval.as_secs(), "Starting exchange rate refresher");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let refreshed = cache.refresh_all().await;
                debug!(refreshed, "Periodic rate refresh complete");
            }
        })
    }

    async fn fetch(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        let source = Arc::clone(&self.inner.source);
        let rate = with_retry(
            &self.inner.retry,
            "exchange_rate",
            CurrencyError::is_transient,
            || {
                let source = Arc::clone(&source);
                async move { source.exchange_rate(currency).await }
            },
        )
        .await?;

        if rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate { currency, rate });
        }

        self.inner.fresh.insert(currency, rate).await;
        self.inner
            .last_known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency, rate);
        Ok(rate)
    }

    /// Start a background refresh unless one is already in flight.
    fn spawn_refresh(&self, currency: CurrencyCode) {
        let started = self
            .inner
            .refreshing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency);
        if !started {
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.fetch(currency).await {
                warn!(
                    %currency,
                    error = %err,
                    "Background rate refresh failed, keeping last-known rate"
                );
            }
            cache
                .inner
                .refreshing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&currency);
        });
    }
}

impl std::fmt::Debug for RateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateCache")
            .field("retry", &self.inner.retry)
            .field("entries", &self.inner.fresh.entry_count())
            .finish_non_exhaustive()
    }
}
