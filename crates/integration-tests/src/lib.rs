//! Integration tests for Pantry.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pantry-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `kitchen_costing` - FIFO costing, shortages and read-only properties
//! - `kitchen_commit` - Check-and-reserve, concurrent commits and atomicity
//! - `kitchen_collaborators` - Retries, rate caching and the base-currency path
//!
//! This library holds the shared fixtures: a pantry builder over the
//! in-memory store and a store wrapper that fails on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use pantry_core::{CurrencyCode, IngredientId, Price, RecipeId, StockLotId, Unit};
use pantry_stock::currency::StaticRateSource;
use pantry_stock::db::StockTransaction;
use pantry_stock::models::{
    Ingredient, PreparationRecord, Recipe, RecipeIngredientRequirement, StockLot,
};
use pantry_stock::{
    CurrencyNormalizer, FixedClock, KitchenService, LotSortKey, MemoryStockStore, PantrySnapshot,
    RateCache, RetryPolicy, StockStore, StoreError,
};

/// Fixed "now" for every fixture.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

#[must_use]
pub fn ingredient(id: i32, name: &str) -> Ingredient {
    Ingredient {
        id: IngredientId::new(id),
        name: name.to_string(),
        category_id: None,
    }
}

#[must_use]
pub fn requirement(ingredient: i32, quantity: Decimal, unit: Unit) -> RecipeIngredientRequirement {
    RecipeIngredientRequirement::new(IngredientId::new(ingredient), quantity, unit)
}

#[must_use]
pub fn recipe(id: i32, name: &str, ingredients: Vec<RecipeIngredientRequirement>) -> Recipe {
    Recipe {
        id: RecipeId::new(id),
        name: name.to_string(),
        category_id: None,
        ingredients,
    }
}

/// An unconsumed lot bought `age_days` ago that expires in 30 days.
#[must_use]
pub fn lot(
    id: i32,
    ingredient: i32,
    quantity: Decimal,
    unit: Unit,
    unit_price: Price,
    age_days: i64,
) -> StockLot {
    StockLot {
        id: StockLotId::new(id),
        ingredient_id: IngredientId::new(ingredient),
        quantity,
        unit,
        unit_price,
        purchased_at: now() - chrono::Duration::days(age_days),
        expires_at: now() + chrono::Duration::days(30),
        consumed_at: None,
        split_from: None,
    }
}

#[must_use]
pub fn ron(amount: Decimal) -> Price {
    Price::new(amount, CurrencyCode::RON)
}

/// Retries fast enough for tests.
#[must_use]
pub const fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

/// A kitchen service over an in-memory store, a static rate table and a
/// fixed clock.
pub struct TestKitchen {
    pub store: MemoryStockStore,
    pub rates: Arc<StaticRateSource>,
    pub clock: Arc<FixedClock>,
    pub service: KitchenService,
}

impl TestKitchen {
    /// Build a kitchen over `snapshot` with no foreign exchange rates.
    ///
    /// # Panics
    ///
    /// Panics if the snapshot is inconsistent.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(snapshot: PantrySnapshot) -> Self {
        let store = MemoryStockStore::from_snapshot(snapshot).expect("valid snapshot");
        Self::over(store.clone(), Arc::new(store))
    }

    /// Build a kitchen whose service talks to `backend` while fixtures
    /// inspect `store`.
    #[must_use]
    pub fn over(store: MemoryStockStore, backend: Arc<dyn StockStore>) -> Self {
        let rates = Arc::new(StaticRateSource::empty());
        let clock = Arc::new(FixedClock::new(now()));
        let cache = RateCache::with_options(rates.clone(), Duration::from_secs(300), fast_retry());
        let service = KitchenService::new(backend, CurrencyNormalizer::new(cache), clock.clone())
            .with_retry(fast_retry());
        Self {
            store,
            rates,
            clock,
            service,
        }
    }
}

/// Store wrapper whose calls fail with `StoreError::Unavailable` until a
/// configured number of failures has been spent.
pub struct FlakyStore {
    inner: MemoryStockStore,
    failures_left: AtomicUsize,
    begin_failures_left: AtomicUsize,
    calls: AtomicUsize,
    lot_reads: AtomicUsize,
}

impl FlakyStore {
    /// Fail the first `failures` calls of any kind.
    #[must_use]
    pub const fn new(inner: MemoryStockStore, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            begin_failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            lot_reads: AtomicUsize::new(0),
        }
    }

    /// Additionally fail the first `failures` attempts to open a transaction.
    #[must_use]
    pub fn with_begin_failures(mut self, failures: usize) -> Self {
        self.begin_failures_left = AtomicUsize::new(failures);
        self
    }

    /// Total calls received, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Lot reads received, counting each transaction opened as one.
    #[must_use]
    pub fn lot_reads(&self) -> usize {
        self.lot_reads.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        spend(&self.failures_left)
    }
}

fn spend(failures_left: &AtomicUsize) -> Result<(), StoreError> {
    let failed = failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if failed {
        Err(StoreError::Unavailable("connection reset".to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl StockStore for FlakyStore {
    async fn recipe_requirements(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<RecipeIngredientRequirement>>, StoreError> {
        self.trip()?;
        self.inner.recipe_requirements(recipe_id).await
    }

    async fn ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>, StoreError> {
        self.trip()?;
        self.inner.ingredient(id).await
    }

    async fn eligible_lots(
        &self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError> {
        self.trip()?;
        self.lot_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.eligible_lots(ingredient_id, as_of).await
    }

    async fn list_lots(
        &self,
        ingredient_id: IngredientId,
        sort: LotSortKey,
    ) -> Result<Vec<StockLot>, StoreError> {
        self.trip()?;
        self.lot_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list_lots(ingredient_id, sort).await
    }

    async fn preparation_history(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Vec<PreparationRecord>, StoreError> {
        self.trip()?;
        self.inner.preparation_history(recipe_id).await
    }

    async fn begin(
        &self,
        ingredients: &[IngredientId],
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        self.trip()?;
        spend(&self.begin_failures_left)?;
        self.lot_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.begin(ingredients).await
    }
}
