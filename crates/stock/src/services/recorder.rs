//! Commits a consumption plan and records the preparation.
//!
//! The plan computed outside the transaction is only a snapshot. Inside the
//! transaction the eligible lots are re-read and the allocation re-run; the
//! re-checked plan is what gets applied.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use pantry_core::StockLotId;

use super::RecipeContext;
use crate::clock::Clock;
use crate::db::{StockStore, StockTransaction, StoreError};
use crate::engine::{LotPool, allocate};
use crate::error::ServiceError;
use crate::models::{
    AllocationResult, ConsumptionStep, NewPreparation, NewStockLot, PreparationRecord, StockLot,
};

/// Applies allocations to the store.
#[derive(Clone)]
pub struct PreparationRecorder {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
}

impl PreparationRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Consume stock for `snapshot.requested` preparations and append the
    /// preparation record, all in one transaction.
    ///
    /// # Errors
    ///
    /// - `ServiceError::MalformedRequest` if `snapshot` has shortages
    /// - `ServiceError::ConcurrentModification` if the re-check inside the
    ///   transaction no longer covers the request
    /// - `ServiceError::Store` if the store fails; nothing is applied
    #[instrument(skip(self, context, snapshot), fields(recipe_id = %context.recipe_id, requested = snapshot.requested))]
    pub async fn commit(
        &self,
        context: &RecipeContext,
        snapshot: &AllocationResult,
    ) -> Result<PreparationRecord, ServiceError> {
        if !snapshot.is_satisfied() {
            return Err(ServiceError::MalformedRequest(
                "cannot commit an allocation that does not cover the request".to_string(),
            ));
        }

        let requested = snapshot.requested;
        let mut tx = self.store.begin(&context.ingredient_ids()).await?;
        let now = self.clock.now();

        let mut pools = HashMap::with_capacity(context.ingredients.len());
        for ingredient in context.ingredients.values() {
            let lots = tx.eligible_lots(ingredient.id, now).await?;
            pools.insert(ingredient.id, LotPool::new(ingredient.clone(), lots, now));
        }

        let fresh = allocate(Some(context.requirements.as_slice()), requested, &pools)
            .map_err(|e| ServiceError::from_allocation(e, context.recipe_id))?;
        if !fresh.is_satisfied() {
            warn!(
                shortages = fresh.shortages.len(),
                "Stock changed before commit, rolling back"
            );
            return Err(ServiceError::ConcurrentModification {
                recipe_id: context.recipe_id,
                shortages: fresh.shortages,
            });
        }
        if fresh.plan != snapshot.plan {
            debug!("Plan changed since snapshot, applying re-checked plan");
        }

        let lots: HashMap<StockLotId, &StockLot> = pools
            .values()
            .flat_map(LotPool::lots)
            .map(|lot| (lot.id, lot))
            .collect();

        for step in fresh.steps() {
            let lot = lots.get(&step.lot_id).ok_or_else(|| {
                StoreError::DataCorruption(format!("planned lot {} vanished", step.lot_id))
            })?;
            apply_step(&mut *tx, lot, step, now).await?;
        }

        let record = tx
            .append_preparation(NewPreparation {
                recipe_id: context.recipe_id,
                amount: requested,
                prepared_at: now,
            })
            .await?;
        tx.commit().await?;

        info!(
            preparation_id = %record.id,
            lots = fresh.steps().count(),
            "Preparation committed"
        );
        Ok(record)
    }
}

/// Full depletion stamps the lot consumed. A partial take shrinks the lot and
/// records the consumed portion as its own consumed lot.
async fn apply_step(
    tx: &mut dyn StockTransaction,
    lot: &StockLot,
    step: &ConsumptionStep,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if step.depletes_lot {
        return tx.mark_consumed(lot.id, now).await;
    }

    tx.update_quantity(lot.id, lot.quantity - step.lot_quantity).await?;
    tx.insert_lot(NewStockLot {
        ingredient_id: lot.ingredient_id,
        quantity: step.lot_quantity,
        unit: lot.unit.clone(),
        unit_price: lot.unit_price,
        purchased_at: lot.purchased_at,
        expires_at: lot.expires_at,
        consumed_at: Some(now),
        split_from: Some(lot.id),
    })
    .await?;
    Ok(())
}
