//! Rate source reading a JSON rate table over HTTP.
//!
//! The feed publishes RON-based rates:
//!
//! ```json
//! { "base": "RON", "rates": { "EUR": "4.9771", "USD": "4.5812" } }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use pantry_core::CurrencyCode;

use super::{CurrencyError, RateSource};

/// Client for a RON-based exchange rate feed.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    url: Url,
}

/// Rate table as published by the feed.
#[derive(Debug, Deserialize)]
struct RateTable {
    base: CurrencyCode,
    rates: HashMap<String, Decimal>,
}

impl RateTable {
    fn rate(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        if !self.base.is_base() {
            return Err(CurrencyError::ForeignBase {
                currency,
                base: self.base,
            });
        }

        let rate = self
            .rates
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(currency.as_str()))
            .map(|(_, rate)| *rate)
            .ok_or(CurrencyError::UnknownCurrency(currency))?;

        if rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate { currency, rate });
        }
        Ok(rate)
    }
}

impl HttpRateSource {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    async fn fetch_table(&self, currency: CurrencyCode) -> Result<RateTable, CurrencyError> {
        let unavailable = |reason: String| CurrencyError::SourceUnavailable { currency, reason };

        let response = self
            .client
            .get(self.url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("rate feed returned HTTP {status}")));
        }

        response
            .json::<RateTable>()
            .await
            .map_err(|e| unavailable(format!("invalid rate table: {e}")))
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn exchange_rate(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        self.fetch_table(currency).await?.rate(currency)
    }
}
