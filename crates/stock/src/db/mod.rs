//! Persistence collaborator for recipes, stock lots and preparation history.
//!
//! # Backends
//!
//! - [`memory::MemoryStockStore`] - Arenas keyed by ID behind one async mutex
//! - [`postgres::PgStockStore`] - `PostgreSQL` via sqlx (feature `postgres`)
//!
//! # Transactions
//!
//! [`StockStore::begin`] opens a transaction scoped to a set of ingredients.
//! Concurrent transactions over overlapping ingredients are serialized for
//! their whole life. Dropping a transaction without calling
//! [`StockTransaction::commit`] rolls it back.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use pantry_core::{IngredientId, RecipeId, StockLotId};

use crate::engine::LotSortKey;
use crate::models::{
    Ingredient, NewPreparation, NewStockLot, PreparationRecord, RecipeIngredientRequirement,
    StockLot,
};

pub use memory::{MemoryStockStore, PantrySnapshot};
#[cfg(feature = "postgres")]
pub use postgres::{PgStockStore, create_pool};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store could not be reached. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The write conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether retrying the call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Database(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            Self::Unavailable(_) => true,
            Self::DataCorruption(_) | Self::NotFound | Self::Conflict(_) => false,
        }
    }
}

/// Read access and transactions over stored stock.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Requirements of one preparation, `None` if the recipe does not exist.
    async fn recipe_requirements(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<RecipeIngredientRequirement>>, StoreError>;

    async fn ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>, StoreError>;

    /// Lots of `ingredient_id` eligible at `as_of`, oldest intake first.
    async fn eligible_lots(
        &self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError>;

    /// Every lot of `ingredient_id`, consumed and expired ones included.
    async fn list_lots(
        &self,
        ingredient_id: IngredientId,
        sort: LotSortKey,
    ) -> Result<Vec<StockLot>, StoreError>;

    /// Preparation records for a recipe, oldest first.
    async fn preparation_history(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Vec<PreparationRecord>, StoreError>;

    /// Open a transaction over the lots of `ingredients`.
    async fn begin(
        &self,
        ingredients: &[IngredientId],
    ) -> Result<Box<dyn StockTransaction>, StoreError>;
}

/// Writes applied atomically on [`commit`](StockTransaction::commit).
#[async_trait]
pub trait StockTransaction: Send {
    /// Lots eligible at `as_of` as seen inside the transaction.
    async fn eligible_lots(
        &mut self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError>;

    /// Set a lot's remaining quantity, in the lot's own unit.
    async fn update_quantity(
        &mut self,
        lot_id: StockLotId,
        quantity: Decimal,
    ) -> Result<(), StoreError>;

    async fn mark_consumed(
        &mut self,
        lot_id: StockLotId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_lot(&mut self, lot: NewStockLot) -> Result<StockLot, StoreError>;

    async fn append_preparation(
        &mut self,
        record: NewPreparation,
    ) -> Result<PreparationRecord, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
