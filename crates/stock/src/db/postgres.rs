//! `PostgreSQL` stock store.
//!
//! # Tables (schema `pantry`)
//!
//! - `ingredient` - `id`, `name`, `category_id`
//! - `recipe` / `recipe_ingredient` - requirements per preparation
//! - `stock_lot` - one row per purchase lot or consumed portion
//! - `preparation` - append-only preparation history
//!
//! Transactions lock the `ingredient` rows they are scoped to with
//! `SELECT ... FOR UPDATE`, in ID order, before touching any lot.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use pantry_core::{
    CategoryId, CurrencyCode, IngredientId, PreparationId, Price, RecipeId, StockLotId, Unit,
};

use super::{StockStore, StockTransaction, StoreError};
use crate::engine::{LotSortKey, eligible_lots};
use crate::models::{
    Ingredient, NewPreparation, NewStockLot, PreparationRecord, RecipeIngredientRequirement,
    StockLot,
};

const LOT_COLUMNS: &str = "id, ingredient_id, quantity, unit, unit_price, currency_code, \
     purchased_at, expires_at, consumed_at, split_from";

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct IngredientRow {
    id: i32,
    name: String,
    category_id: Option<i32>,
}

impl From<IngredientRow> for Ingredient {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: IngredientId::new(row.id),
            name: row.name,
            category_id: row.category_id.map(CategoryId::new),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequirementRow {
    ingredient_id: i32,
    quantity: Decimal,
    unit: String,
}

impl From<RequirementRow> for RecipeIngredientRequirement {
    fn from(row: RequirementRow) -> Self {
        Self::new(
            IngredientId::new(row.ingredient_id),
            row.quantity,
            Unit::parse(&row.unit),
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockLotRow {
    id: i32,
    ingredient_id: i32,
    quantity: Decimal,
    unit: String,
    unit_price: Decimal,
    currency_code: String,
    purchased_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
    split_from: Option<i32>,
}

impl TryFrom<StockLotRow> for StockLot {
    type Error = StoreError;

    fn try_from(row: StockLotRow) -> Result<Self, Self::Error> {
        let currency_code = CurrencyCode::parse(&row.currency_code).map_err(|e| {
            StoreError::DataCorruption(format!("lot {} has invalid currency: {e}", row.id))
        })?;

        Ok(Self {
            id: StockLotId::new(row.id),
            ingredient_id: IngredientId::new(row.ingredient_id),
            quantity: row.quantity,
            unit: Unit::parse(&row.unit),
            unit_price: Price::new(row.unit_price, currency_code),
            purchased_at: row.purchased_at,
            expires_at: row.expires_at,
            consumed_at: row.consumed_at,
            split_from: row.split_from.map(StockLotId::new),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PreparationRow {
    id: i32,
    recipe_id: i32,
    amount: i32,
    prepared_at: DateTime<Utc>,
}

impl TryFrom<PreparationRow> for PreparationRecord {
    type Error = StoreError;

    fn try_from(row: PreparationRow) -> Result<Self, Self::Error> {
        let amount = u32::try_from(row.amount).map_err(|_| {
            StoreError::DataCorruption(format!(
                "preparation {} has negative amount {}",
                row.id, row.amount
            ))
        })?;

        Ok(Self {
            id: PreparationId::new(row.id),
            recipe_id: RecipeId::new(row.recipe_id),
            amount,
            prepared_at: row.prepared_at,
        })
    }
}

fn into_lots(rows: Vec<StockLotRow>) -> Result<Vec<StockLot>, StoreError> {
    rows.into_iter().map(StockLot::try_from).collect()
}

fn eligible_lots_query() -> String {
    format!(
        "SELECT {LOT_COLUMNS} FROM pantry.stock_lot \
         WHERE ingredient_id = $1 AND consumed_at IS NULL \
           AND expires_at > $2 AND quantity > 0 \
         ORDER BY id"
    )
}

// =============================================================================
// Store
// =============================================================================

/// Stock store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    #[instrument(skip(self))]
    async fn recipe_requirements(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<RecipeIngredientRequirement>>, StoreError> {
        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM pantry.recipe WHERE id = $1")
            .bind(recipe_id.as_i32())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows: Vec<RequirementRow> = sqlx::query_as(
            "SELECT ingredient_id, quantity, unit FROM pantry.recipe_ingredient \
             WHERE recipe_id = $1 ORDER BY id",
        )
        .bind(recipe_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(rows.into_iter().map(Into::into).collect()))
    }

    async fn ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>, StoreError> {
        let row: Option<IngredientRow> =
            sqlx::query_as("SELECT id, name, category_id FROM pantry.ingredient WHERE id = $1")
                .bind(id.as_i32())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Into::into))
    }

    async fn eligible_lots(
        &self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError> {
        let rows: Vec<StockLotRow> = sqlx::query_as(&eligible_lots_query())
            .bind(ingredient_id.as_i32())
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;

        Ok(eligible_lots(into_lots(rows)?, as_of))
    }

    async fn list_lots(
        &self,
        ingredient_id: IngredientId,
        sort: LotSortKey,
    ) -> Result<Vec<StockLot>, StoreError> {
        let rows: Vec<StockLotRow> = sqlx::query_as(&format!(
            "SELECT {LOT_COLUMNS} FROM pantry.stock_lot WHERE ingredient_id = $1"
        ))
        .bind(ingredient_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        let mut lots = into_lots(rows)?;
        sort.sort(&mut lots);
        Ok(lots)
    }

    async fn preparation_history(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Vec<PreparationRecord>, StoreError> {
        let rows: Vec<PreparationRow> = sqlx::query_as(
            "SELECT id, recipe_id, amount, prepared_at FROM pantry.preparation \
             WHERE recipe_id = $1 ORDER BY prepared_at, id",
        )
        .bind(recipe_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PreparationRecord::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn begin(
        &self,
        ingredients: &[IngredientId],
    ) -> Result<Box<dyn StockTransaction>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut ids: Vec<i32> = ingredients.iter().map(IngredientId::as_i32).collect();
        ids.sort_unstable();
        ids.dedup();

        let locked: Vec<i32> = sqlx::query_scalar(
            "SELECT id FROM pantry.ingredient WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
        if locked.len() != ids.len() {
            return Err(StoreError::NotFound);
        }

        Ok(Box::new(PgStockTransaction {
            tx,
            scope: ingredients.to_vec(),
        }))
    }
}

/// Transaction over a [`PgStockStore`].
struct PgStockTransaction {
    tx: Transaction<'static, Postgres>,
    scope: Vec<IngredientId>,
}

impl PgStockTransaction {
    fn check_scope(&self, ingredient_id: IngredientId) -> Result<(), StoreError> {
        if self.scope.contains(&ingredient_id) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "ingredient {ingredient_id} is outside the transaction scope"
            )))
        }
    }

    /// Ingredient of an unconsumed lot, checked against the scope.
    async fn open_lot(&mut self, lot_id: StockLotId) -> Result<(), StoreError> {
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT ingredient_id, consumed_at FROM pantry.stock_lot WHERE id = $1",
        )
        .bind(lot_id.as_i32())
        .fetch_optional(&mut *self.tx)
        .await?;

        let (ingredient_id, consumed_at) = row.ok_or(StoreError::NotFound)?;
        self.check_scope(IngredientId::new(ingredient_id))?;
        if consumed_at.is_some() {
            return Err(StoreError::Conflict(format!("lot {lot_id} is already consumed")));
        }
        Ok(())
    }
}

#[async_trait]
impl StockTransaction for PgStockTransaction {
    async fn eligible_lots(
        &mut self,
        ingredient_id: IngredientId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StockLot>, StoreError> {
        self.check_scope(ingredient_id)?;
        let rows: Vec<StockLotRow> = sqlx::query_as(&eligible_lots_query())
            .bind(ingredient_id.as_i32())
            .bind(as_of)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(eligible_lots(into_lots(rows)?, as_of))
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
        self.open_lot(lot_id).await?;
        sqlx::query("UPDATE pantry.stock_lot SET quantity = $2 WHERE id = $1")
            .bind(lot_id.as_i32())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_consumed(
        &mut self,
        lot_id: StockLotId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.open_lot(lot_id).await?;
        sqlx::query("UPDATE pantry.stock_lot SET consumed_at = $2 WHERE id = $1")
            .bind(lot_id.as_i32())
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_lot(&mut self, lot: NewStockLot) -> Result<StockLot, StoreError> {
        self.check_scope(lot.ingredient_id)?;
        let row: StockLotRow = sqlx::query_as(&format!(
            "INSERT INTO pantry.stock_lot ( \
                 ingredient_id, quantity, unit, unit_price, currency_code, \
                 purchased_at, expires_at, consumed_at, split_from \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot.ingredient_id.as_i32())
        .bind(lot.quantity)
        .bind(lot.unit.symbol())
        .bind(lot.unit_price.amount)
        .bind(lot.unit_price.currency_code.as_str())
        .bind(lot.purchased_at)
        .bind(lot.expires_at)
        .bind(lot.consumed_at)
        .bind(lot.split_from.map(|id| id.as_i32()))
        .fetch_one(&mut *self.tx)
        .await?;

        StockLot::try_from(row)
    }

    async fn append_preparation(
        &mut self,
        record: NewPreparation,
    ) -> Result<PreparationRecord, StoreError> {
        let amount = i32::try_from(record.amount).map_err(|_| {
            StoreError::Conflict(format!("preparation amount {} is too large", record.amount))
        })?;

        let row: PreparationRow = sqlx::query_as(
            "INSERT INTO pantry.preparation (recipe_id, amount, prepared_at) \
             VALUES ($1, $2, $3) \
             RETURNING id, recipe_id, amount, prepared_at",
        )
        .bind(record.recipe_id.as_i32())
        .bind(amount)
        .bind(record.prepared_at)
        .fetch_one(&mut *self.tx)
        .await?;

        PreparationRecord::try_from(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { tx, .. } = *self;
        tx.commit().await?;
        Ok(())
    }
}
