//! Kitchen commands: capacity, preparation, stock listings and intake.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use pantry_core::{CurrencyCode, IngredientId, Price, RecipeId, Unit};
use pantry_stock::models::NewStockLot;
use pantry_stock::{KitchenService, LotSortKey};

use super::snapshot::Pantry;
use super::{CommandResult, emit};

/// Print how many times a recipe can be prepared and what that costs.
///
/// # Errors
///
/// Returns an error if the recipe is unknown or costing fails.
pub async fn max(service: &KitchenService, recipe: RecipeId) -> CommandResult {
    let max = service.max_preparations(recipe).await?;
    info!(
        recipe_id = %recipe,
        max = max.max_preparations,
        "Computed capacity"
    );
    emit(&max)
}

/// Print a cost quote for `amount` preparations without consuming stock.
///
/// # Errors
///
/// Returns an error if the recipe is unknown or costing fails.
pub async fn quote(service: &KitchenService, recipe: RecipeId, amount: u32) -> CommandResult {
    let quote = service.quote(recipe, amount).await?;
    emit(&quote)
}

/// Reserve stock for `amount` preparations.
///
/// Returns `Ok(true)` when stock was consumed. Shortages are printed and
/// reported as `Ok(false)`.
///
/// # Errors
///
/// Returns an error for unknown recipes, invalid amounts or store failures.
pub async fn prepare(
    service: &KitchenService,
    recipe: RecipeId,
    amount: i32,
) -> Result<bool, Box<dyn std::error::Error>> {
    let reservation = service.check_and_reserve(recipe, amount).await?;
    emit(&reservation)?;

    if !reservation.success {
        for shortage in &reservation.shortages {
            warn!(
                ingredient = %shortage.ingredient_name,
                missing = %shortage.missing_quantity,
                unit = %shortage.display_unit,
                "Short"
            );
        }
    }
    Ok(reservation.success)
}

/// Print every lot of an ingredient with its status.
///
/// # Errors
///
/// Returns an error if the ingredient is unknown.
pub async fn lots(
    service: &KitchenService,
    ingredient: IngredientId,
    sort: LotSortKey,
) -> CommandResult {
    let listing = service.stock_listing(ingredient, sort).await?;
    emit(&listing)
}

/// Print a recipe's preparation history.
///
/// # Errors
///
/// Returns an error if the recipe is unknown.
pub async fn history(service: &KitchenService, recipe: RecipeId) -> CommandResult {
    let records = service.preparation_history(recipe).await?;
    emit(&records)
}

/// A purchase to take into stock.
#[derive(Debug, Clone)]
pub struct Intake {
    pub ingredient: IngredientId,
    pub quantity: Decimal,
    pub unit: Unit,
    pub unit_price: Decimal,
    pub currency: CurrencyCode,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Add a purchased lot to the pantry file.
///
/// # Errors
///
/// Returns an error for non-positive quantities, an expiry before the
/// purchase, an unknown ingredient, or a failed save.
pub async fn intake(pantry: &Pantry, intake: Intake) -> CommandResult {
    if intake.quantity <= Decimal::ZERO {
        return Err(format!("quantity must be positive (got {})", intake.quantity).into());
    }
    if intake.unit_price < Decimal::ZERO {
        return Err(format!("unit price cannot be negative (got {})", intake.unit_price).into());
    }
    if intake.expires_at <= intake.purchased_at {
        return Err("expiry must be after the purchase date".into());
    }

    let lot = pantry
        .store
        .insert_lot(NewStockLot {
            ingredient_id: intake.ingredient,
            quantity: intake.quantity,
            unit: intake.unit,
            unit_price: Price::new(intake.unit_price, intake.currency),
            purchased_at: intake.purchased_at,
            expires_at: intake.expires_at,
            consumed_at: None,
            split_from: None,
        })
        .await
        .map_err(|e| format!("cannot take ingredient {} into stock: {e}", intake.ingredient))?;

    pantry.persist().await?;
    info!(lot_id = %lot.id, ingredient_id = %lot.ingredient_id, "Lot added");
    emit(&lot)
}
