//! Kitchen-facing operations: how much can be made, at what cost, and
//! reserving stock for a preparation.
//!
//! Reads are snapshot-based and take no locks. Only
//! [`KitchenService::check_and_reserve`] writes, through the
//! [`PreparationRecorder`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use pantry_core::{IngredientId, RecipeId};

use super::{PreparationRecorder, RecipeContext};
use crate::clock::Clock;
use crate::currency::CurrencyNormalizer;
use crate::db::{StockStore, StoreError};
use crate::engine::{self, LotPool, LotSortKey, cost_plan};
use crate::error::ServiceError;
use crate::models::{
    AllocationResult, CostSummary, LotListing, MaxPreparations, PreparationRecord, Quote,
    Reservation,
};
use crate::retry::{RetryPolicy, with_retry};

/// Entry point for kitchen operations.
#[derive(Clone)]
pub struct KitchenService {
    store: Arc<dyn StockStore>,
    currency: CurrencyNormalizer,
    clock: Arc<dyn Clock>,
    recorder: PreparationRecorder,
    retry: RetryPolicy,
}

impl KitchenService {
    #[must_use]
    pub fn new(
        store: Arc<dyn StockStore>,
        currency: CurrencyNormalizer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recorder = PreparationRecorder::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            currency,
            clock,
            recorder,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for store calls.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// How many times the recipe can be prepared from current stock, with
    /// the FIFO cost of preparing all of them.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecipeNotFound`, `MalformedRequest` for an
    /// invalid recipe, `RateUnavailable` or `Store`.
    #[instrument(skip(self))]
    pub async fn max_preparations(
        &self,
        recipe_id: RecipeId,
    ) -> Result<MaxPreparations, ServiceError> {
        let context = self.load_context(recipe_id).await?;
        let now = self.clock.now();
        let pools = self.load_pools(&context, now).await?;

        let max = engine::max_preparations(&context.requirements, &pools)
            .map_err(|e| ServiceError::from_allocation(e, recipe_id))?;

        let cost = if max == 0 {
            CostSummary::zero()
        } else {
            let allocation = engine::allocate(Some(context.requirements.as_slice()), max, &pools)
                .map_err(|e| ServiceError::from_allocation(e, recipe_id))?;
            cost_plan(&allocation.plan, max, &self.currency)
                .await?
                .rounded()
        };

        debug!(max, total_cost = %cost.total_cost, "Computed max preparations");
        Ok(MaxPreparations {
            recipe_id,
            max_preparations: max,
            total_cost: cost.total_cost,
            unit_cost: cost.unit_cost,
            currency: cost.currency,
        })
    }

    /// Allocate and cost `desired` preparations without consuming anything.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecipeNotFound`, `MalformedRequest`,
    /// `RateUnavailable` or `Store`. Shortages are part of the quote.
    #[instrument(skip(self))]
    pub async fn quote(&self, recipe_id: RecipeId, desired: u32) -> Result<Quote, ServiceError> {
        if desired == 0 {
            return Err(malformed_count(i64::from(desired)));
        }
        let (_, allocation) = self.plan(recipe_id, desired).await?;

        let cost = if allocation.is_satisfied() {
            Some(
                cost_plan(&allocation.plan, desired, &self.currency)
                    .await?
                    .rounded(),
            )
        } else {
            None
        };

        Ok(Quote {
            recipe_id,
            allocation,
            cost,
        })
    }

    /// Reserve stock for `desired` preparations and record them.
    ///
    /// Insufficient stock returns `success = false` with itemized shortages.
    /// A recipe without ingredients is never preparable and is refused with
    /// no shortages.
    ///
    /// # Errors
    ///
    /// - `ServiceError::MalformedRequest` for `desired <= 0`, checked before
    ///   any store access
    /// - `ServiceError::RecipeNotFound` if the recipe does not exist
    /// - `ServiceError::ConcurrentModification` if stock changed between
    ///   planning and commit
    /// - `ServiceError::Store` if the store keeps failing
    #[instrument(skip(self))]
    pub async fn check_and_reserve(
        &self,
        recipe_id: RecipeId,
        desired: i32,
    ) -> Result<Reservation, ServiceError> {
        let desired = u32::try_from(desired)
            .ok()
            .filter(|count| *count > 0)
            .ok_or_else(|| malformed_count(i64::from(desired)))?;

        let (context, allocation) = self.plan(recipe_id, desired).await?;
        if !allocation.is_satisfied() {
            info!(
                max = allocation.max_preparations,
                shortages = allocation.shortages.len(),
                "Not enough stock, nothing reserved"
            );
            return Ok(Reservation::rejected(recipe_id, allocation.shortages));
        }

        let record = with_retry(
            &self.retry,
            "commit_preparation",
            |err: &ServiceError| matches!(err, ServiceError::Store(e) if e.is_transient()),
            || self.recorder.commit(&context, &allocation),
        )
        .await?;

        Ok(Reservation::committed(record))
    }

    /// Preparation records for a recipe, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecipeNotFound` or `Store`.
    #[instrument(skip(self))]
    pub async fn preparation_history(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Vec<PreparationRecord>, ServiceError> {
        let store = &self.store;
        self.retry_store("recipe_requirements", || store.recipe_requirements(recipe_id))
            .await?
            .ok_or(ServiceError::RecipeNotFound(recipe_id))?;

        Ok(self
            .retry_store("preparation_history", || {
                store.preparation_history(recipe_id)
            })
            .await?)
    }

    /// Every lot of an ingredient with its status, in `sort` order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::IngredientNotFound` or `Store`.
    #[instrument(skip(self))]
    pub async fn stock_listing(
        &self,
        ingredient_id: IngredientId,
        sort: LotSortKey,
    ) -> Result<Vec<LotListing>, ServiceError> {
        let store = &self.store;
        self.retry_store("ingredient", || store.ingredient(ingredient_id))
            .await?
            .ok_or(ServiceError::IngredientNotFound(ingredient_id))?;

        let now = self.clock.now();
        let lots = self
            .retry_store("list_lots", || store.list_lots(ingredient_id, sort))
            .await?;

        Ok(lots
            .into_iter()
            .map(|lot| LotListing {
                status: lot.status(now),
                lot,
            })
            .collect())
    }

    async fn plan(
        &self,
        recipe_id: RecipeId,
        desired: u32,
    ) -> Result<(RecipeContext, AllocationResult), ServiceError> {
        let context = self.load_context(recipe_id).await?;
        let pools = self.load_pools(&context, self.clock.now()).await?;
        let allocation = engine::allocate(Some(context.requirements.as_slice()), desired, &pools)
            .map_err(|e| ServiceError::from_allocation(e, recipe_id))?;
        Ok((context, allocation))
    }

    async fn load_context(&self, recipe_id: RecipeId) -> Result<RecipeContext, ServiceError> {
        let store = &self.store;
        let requirements = self
            .retry_store("recipe_requirements", || store.recipe_requirements(recipe_id))
            .await?
            .ok_or(ServiceError::RecipeNotFound(recipe_id))?;

        // Invalid requirements are refused before any ingredient or lot read.
        engine::merge_requirements(&requirements)
            .map_err(|e| ServiceError::from_allocation(e, recipe_id))?;

        let mut ingredients = HashMap::with_capacity(requirements.len());
        for requirement in &requirements {
            let id = requirement.ingredient_id;
            if ingredients.contains_key(&id) {
                continue;
            }
            let ingredient = self
                .retry_store("ingredient", || store.ingredient(id))
                .await?
                .ok_or_else(|| {
                    StoreError::DataCorruption(format!(
                        "recipe {recipe_id} requires unknown ingredient {id}"
                    ))
                })?;
            ingredients.insert(id, ingredient);
        }

        Ok(RecipeContext {
            recipe_id,
            requirements,
            ingredients,
        })
    }

    async fn load_pools(
        &self,
        context: &RecipeContext,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<IngredientId, LotPool>, ServiceError> {
        let store = &self.store;
        let mut pools = HashMap::with_capacity(context.ingredients.len());
        for ingredient in context.ingredients.values() {
            let id = ingredient.id;
            let lots = self
                .retry_store("eligible_lots", || store.eligible_lots(id, as_of))
                .await?;
            pools.insert(id, LotPool::new(ingredient.clone(), lots, as_of));
        }
        Ok(pools)
    }

    async fn retry_store<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        with_retry(&self.retry, operation, StoreError::is_transient, f).await
    }
}

fn malformed_count(desired: i64) -> ServiceError {
    ServiceError::MalformedRequest(format!(
        "desired preparations must be positive (got {desired})"
    ))
}

impl std::fmt::Debug for KitchenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KitchenService")
            .field("currency", &self.currency)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
