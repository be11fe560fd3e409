//! Stock engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `PANTRY_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `PANTRY_RATES_URL` - JSON exchange rate feed
//! - `PANTRY_RATE_TTL_SECS` - Freshness window for fetched rates (default: 300)
//! - `PANTRY_RATE_REFRESH_SECS` - Background rate refresh interval (default: 60)
//! - `PANTRY_RETRY_ATTEMPTS` - Attempts per collaborator call (default: 3)
//! - `PANTRY_RETRY_BACKOFF_MS` - Backoff before the first retry (default: 100)

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::retry::RetryPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Stock engine configuration.
#[derive(Clone)]
pub struct StockConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Exchange rate feed; `None` means rates come from a static table
    pub rates_url: Option<Url>,
    /// How long a fetched rate counts as fresh
    pub rate_ttl: Duration,
    /// How often known rates are refreshed in the background
    pub rate_refresh_interval: Duration,
    /// Retry policy for store and rate lookups
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for StockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rates_url", &self.rates_url.as_ref().map(Url::as_str))
            .field("rate_ttl", &self.rate_ttl)
            .field("rate_refresh_interval", &self.rate_refresh_interval)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            rates_url: None,
            rate_ttl: Duration::from_secs(300),
            rate_refresh_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl StockConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration through `get`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get("PANTRY_DATABASE_URL")
            .or_else(|| get("DATABASE_URL"))
            .map(SecretString::from);

        let rates_url = get("PANTRY_RATES_URL")
            .map(|value| {
                Url::parse(&value).map_err(|e| {
                    ConfigError::InvalidEnvVar("PANTRY_RATES_URL".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let rate_ttl = Duration::from_secs(parse_or_default(&get, "PANTRY_RATE_TTL_SECS", 300)?);
        let rate_refresh_interval =
            Duration::from_secs(parse_or_default(&get, "PANTRY_RATE_REFRESH_SECS", 60)?);
        if rate_refresh_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "PANTRY_RATE_REFRESH_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let max_attempts: u32 = parse_or_default(&get, "PANTRY_RETRY_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PANTRY_RETRY_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backoff_ms = parse_or_default(&get, "PANTRY_RETRY_BACKOFF_MS", 100)?;

        Ok(Self {
            database_url,
            rates_url,
            rate_ttl,
            rate_refresh_interval,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
        })
    }

    /// Database URL, required when running against `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no URL was configured.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("PANTRY_DATABASE_URL".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a variable, falling back to `default` when unset.
fn parse_or_default<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
