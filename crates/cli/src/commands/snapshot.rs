//! Loading and saving the YAML pantry file, and wiring the kitchen service
//! over it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pantry_core::CurrencyCode;
use pantry_stock::currency::{HttpRateSource, StaticRateSource};
use pantry_stock::{
    CurrencyNormalizer, KitchenService, MemoryStockStore, PantrySnapshot, RateCache, RateSource,
    StockConfig, StockStore, StoreError, SystemClock,
};

/// Errors reading or writing the pantry file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid pantry file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("inconsistent pantry file: {0}")]
    Store(#[from] StoreError),
}

/// On-disk layout: the store snapshot plus a static exchange rate table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PantryFile {
    /// RON per one unit of each currency, used when no rate feed is configured.
    #[serde(default)]
    pub rates: BTreeMap<CurrencyCode, Decimal>,
    #[serde(flatten)]
    pub snapshot: PantrySnapshot,
}

impl PantryFile {
    /// Read and parse a pantry file.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SnapshotError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the file through a sibling temporary file so a failed write
    /// never leaves a truncated pantry behind.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        let write_err = |source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, content).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }
}

/// The kitchen service together with the file it was loaded from.
///
/// Dropping it stops the rate refresher, if one was started.
pub struct Pantry {
    pub service: KitchenService,
    pub store: MemoryStockStore,
    path: PathBuf,
    rates: BTreeMap<CurrencyCode, Decimal>,
    refresher: Option<JoinHandle<()>>,
}

impl Pantry {
    /// Load `path` and build a service over it.
    ///
    /// Rates come from `PANTRY_RATES_URL` when configured, otherwise from the
    /// file's `rates` table.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the file is unreadable or inconsistent.
    pub async fn open(path: &Path, config: &StockConfig) -> Result<Self, SnapshotError> {
        let file = PantryFile::load(path).await?;
        debug!(
            ingredients = file.snapshot.ingredients.len(),
            recipes = file.snapshot.recipes.len(),
            lots = file.snapshot.lots.len(),
            "Loaded pantry file"
        );

        let store = MemoryStockStore::from_snapshot(file.snapshot)?;
        let (service, refresher) = build_service(Arc::new(store.clone()), &file.rates, config);

        Ok(Self {
            service,
            store,
            path: path.to_path_buf(),
            rates: file.rates,
            refresher,
        })
    }

    /// Write the store's current contents back to the file.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the write fails.
    pub async fn persist(&self) -> Result<(), SnapshotError> {
        let file = PantryFile {
            rates: self.rates.clone(),
            snapshot: self.store.snapshot().await,
        };
        file.save(&self.path).await?;
        info!(path = %self.path.display(), "Saved pantry file");
        Ok(())
    }
}

impl Drop for Pantry {
    fn drop(&mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
    }
}

/// Build a kitchen service over `store`.
///
/// With a rate feed configured, a background task refreshes known rates
/// every `rate_refresh_interval`; its handle is returned so the caller can
/// stop it. A static rate table never changes and gets no refresher.
pub fn build_service(
    store: Arc<dyn StockStore>,
    static_rates: &BTreeMap<CurrencyCode, Decimal>,
    config: &StockConfig,
) -> (KitchenService, Option<JoinHandle<()>>) {
    let (cache, refresher) = match &config.rates_url {
        Some(url) => {
            debug!(%url, "Using exchange rate feed");
            let source: Arc<dyn RateSource> = Arc::new(HttpRateSource::new(url.clone()));
            let cache = RateCache::with_options(source, config.rate_ttl, config.retry);
            let refresher = cache.spawn_refresher(config.rate_refresh_interval);
            (cache, Some(refresher))
        }
        None => {
            let source: Arc<dyn RateSource> = Arc::new(StaticRateSource::new(
                static_rates.iter().map(|(code, rate)| (*code, *rate)),
            ));
            (
                RateCache::with_options(source, config.rate_ttl, config.retry),
                None,
            )
        }
    };

    let service =
        KitchenService::new(store, CurrencyNormalizer::new(cache), Arc::new(SystemClock))
            .with_retry(config.retry);
    (service, refresher)
}
