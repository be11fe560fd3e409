//! In-memory stock store.
//!
//! All state sits behind one `tokio::sync::Mutex`. A transaction takes the
//! owned guard for its whole life and edits a working copy, which replaces
//! the shared state only on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use pantry_core::{IngredientId, PreparationId, RecipeId, StockLotId};

use super::{StockStore, StockTransaction, StoreError};
use crate::engine::{LotSortKey, eligible_lots};
use crate::models::{
    Ingredient, NewPreparation, NewStockLot, PreparationRecord, Recipe,
    RecipeIngredientRequirement, StockLot,
};

/// Serializable contents of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PantrySnapshot {
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub lots: Vec<StockLot>,
    #[serde(default)]
    pub history: Vec<PreparationRecord>,
}

#[derive(Debug, Clone)]
struct MemoryState {
    ingredients: BTreeMap<IngredientId, Ingredient>,
    recipes: BTreeMap<RecipeId, Recipe>,
    lots: BTreeMap<StockLotId, StockLot>,
    history: Vec<PreparationRecord>,
    next_lot_id: i32,
    next_preparation_id: i32,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            ingredients: BTreeMap::new(),
            recipes: BTreeMap::new(),
            lots: BTreeMap::new(),
            history: Vec::new(),
            next_lot_id: 1,
            next_preparation_id: 1,
        }
    }
}

impl MemoryState {
    fn from_snapshot(snapshot: PantrySnapshot) -> Result<Self, StoreError> {
        let mut state = Self::default();

        for ingredient in snapshot.ingredients {
            let id = ingredient.id;
            if state.ingredients.insert(id, ingredient).is_some() {
                return Err(StoreError::DataCorruption(format!(
                    "duplicate ingredient {id}"
                )));
            }
        }

        for recipe in snapshot.recipes {
            let id = recipe.id;
            if let Some(requirement) = recipe
                .ingredients
                .iter()
                .find(|r| !state.ingredients.contains_key(&r.ingredient_id))
            {
                return Err(StoreError::DataCorruption(format!(
                    "recipe {id} requires unknown ingredient {}",
                    requirement.ingredient_id
                )));
            }
            if state.recipes.insert(id, recipe).is_some() {
                return Err(StoreError::DataCorruption(format!("duplicate recipe {id}")));
            }
        }

        for lot in snapshot.lots {
            let id = lot.id;
            if !state.ingredients.contains_key(&lot.ingredient_id) {
                return Err(StoreError::DataCorruption(format!(
                    "lot {id} holds unknown ingredient {}",
                    lot.ingredient_id
                )));
            }
            state.next_lot_id = state.next_lot_id.max(id.as_i32().saturating_add(1));
            if state.lots.insert(id, lot).is_some() {
                return Err(StoreError::DataCorruption(format!("duplicate lot {id}")));
            }
        }

        for record in &snapshot.history {
            state.next_preparation_id = state
                .next_preparation_id
                .max(record.id.as_i32().saturating_add(1));
        }
        state.history = snapshot.history;

        Ok(state)
    }

    fn snapshot(&self) -> PantrySnapshot {
        PantrySnapshot {
            ingredients: self.ingredients.values().cloned().collect(),
            recipes: self.recipes.values().cloned().collect(),
            lots: self.lots.values().cloned().collect(),
            history: self.history.clone(),
        }
    }

    fn eligible_lots(&self, ingredient_id: IngredientId, as_of: DateTime<Utc>) -> Vec<StockLot> {
        eligible_lots(
            self.lots
                .values()
                .filter(|lot| lot.ingredient_id == ingredient_id)
                .cloned(),
            as_of,
        )
    }

    fn insert_lot(&mut self, lot: NewStockLot) -> Result<StockLot, StoreError> {
        if !self.ingredients.contains_key(&lot.ingredient_id) {
            return Err(StoreError::NotFound);
        }
        let id = StockLotId::new(self.next_lot_id);
        self.next_lot_id = self
            .next_lot_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Conflict("lot IDs exhausted".to_string()))?;
        let lot = lot.with_id(id);
        self.lots.insert(id, lot.clone());
        Ok(lot)
    }
}

/// Stock store held entirely in memory.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStockStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStockStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DataCorruption` for duplicate IDs or references
    /// to unknown ingredients.
    pub fn from_snapshot(snapshot: PantrySnapshot) -> Result<Self, StoreError> {
        Ok(Self {
            state: Arc::new(Mutex::new(MemoryState::from_snapshot(snapshot)?)),
        })
    }

    /// Current contents, for saving.
    pub async fn snapshot(&self) -> PantrySnapshot {
        self.state.lock().await.snapshot()
    }

    /// Take a new lot into stock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the ingredient does not exist.
    pub async fn insert_lot(&self, lot: NewStockLot) -> Result<StockLot, StoreError> {
        self.state.lock().await.insert_lot(lot)
    }

    pub async fn lot(&self, id: StockLotId) -> Option<StockLot> {
        self.state.lock().await.lots.get(&id).cloned()
    }

    pub async fn recipe(&self, id: RecipeId) -> Option<Recipe> {
        self.state.lock().await.recipes.get(&id).cloned()
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn recipe_requirements(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<RecipeIngredientRequirement>>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .recipes
            .get(&recipe_id)
            .map(|recipe| recipe.ingredients.clone()))
    }

    async fn ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>, StoreError> {
        Ok(self.state.lock().await.ingredients.get(&id).cloned())
    }

    async fn eligible_lots(
        &self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError> {
        Ok(self.state.lock().await.eligible_lots(ingredient_id, as_of))
    }

    async fn list_lots(
        &self,
        ingredient_id: IngredientId,
        sort: LotSortKey,
    ) -> Result<Vec<StockLot>, StoreError> {
        let mut lots: Vec<StockLot> = self
            .state
            .lock()
            .await
            .lots
            .values()
            .filter(|lot| lot.ingredient_id == ingredient_id)
            .cloned()
            .collect();
        sort.sort(&mut lots);
        Ok(lots)
    }

    async fn preparation_history(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Vec<PreparationRecord>, StoreError> {
        let mut records: Vec<PreparationRecord> = self
            .state
            .lock()
            .await
            .history
            .iter()
            .filter(|record| record.recipe_id == recipe_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.prepared_at, record.id));
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn begin(
        &self,
        ingredients: &[IngredientId],
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            scope: ingredients.to_vec(),
        }))
    }
}

/// Transaction over a [`MemoryStockStore`].
struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    scope: Vec<IngredientId>,
}

impl MemoryTransaction {
    fn check_scope(&self, ingredient_id: IngredientId) -> Result<(), StoreError> {
        if self.scope.contains(&ingredient_id) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "ingredient {ingredient_id} is outside the transaction scope"
            )))
        }
    }

    fn open_lot(&mut self, lot_id: StockLotId) -> Result<&mut StockLot, StoreError> {
        let ingredient_id = self
            .working
            .lots
            .get(&lot_id)
            .ok_or(StoreError::NotFound)?
            .ingredient_id;
        self.check_scope(ingredient_id)?;

        let lot = self
            .working
            .lots
            .get_mut(&lot_id)
            .ok_or(StoreError::NotFound)?;
        if lot.consumed_at.is_some() {
            return Err(StoreError::Conflict(format!("lot {lot_id} is already consumed")));
        }
        Ok(lot)
    }
}

#[async_trait]
impl StockTransaction for MemoryTransaction {
    async fn eligible_lots(
        &mut self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError> {
        self.check_scope(ingredient_id)?;
        Ok(self.working.eligible_lots(ingredient_id, as_of))
    }

    async fn update_quantity(
        &mut self,
        lot_id: StockLotId,
        quantity: Decimal,
    ) -> Result<(), StoreError> {
        if quantity < Decimal::ZERO {
            return Err(StoreError::Conflict(format!(
                "lot {lot_id} cannot hold a negative quantity"
            )));
        }
        self.open_lot(lot_id)?.quantity = quantity;
        Ok(())
    }

    async fn mark_consumed(
        &mut self,
        lot_id: StockLotId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.open_lot(lot_id)?.consumed_at = Some(at);
        Ok(())
    }

    async fn insert_lot(&mut self, lot: NewStockLot) -> Result<StockLot, StoreError> {
        self.check_scope(lot.ingredient_id)?;
        self.working.insert_lot(lot)
    }

    async fn append_preparation(
        &mut self,
        record: NewPreparation,
    ) -> Result<PreparationRecord, StoreError> {
        if !self.working.recipes.contains_key(&record.recipe_id) {
            return Err(StoreError::NotFound);
        }
        let id = PreparationId::new(self.working.next_preparation_id);
        self.working.next_preparation_id = self
            .working
            .next_preparation_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Conflict("preparation IDs exhausted".to_string()))?;
        let record = record.with_id(id);
        self.working.history.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
