//! Recipe requirement and preparation history models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{CategoryId, IngredientId, PreparationId, RecipeId, Unit};

/// A recipe and the ingredients one preparation consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique recipe ID.
    pub id: RecipeId,
    /// Display name.
    pub name: String,
    /// Optional category reference.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Ingredient requirements for a single preparation.
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredientRequirement>,
}

/// Quantity of one ingredient needed for a single preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeIngredientRequirement {
    /// Ingredient required.
    pub ingredient_id: IngredientId,
    /// Quantity per preparation, expressed in `unit`.
    pub quantity: Decimal,
    /// Unit of measure.
    pub unit: Unit,
}

impl RecipeIngredientRequirement {
    /// Create a requirement.
    #[must_use]
    pub const fn new(ingredient_id: IngredientId, quantity: Decimal, unit: Unit) -> Self {
        Self {
            ingredient_id,
            quantity,
            unit,
        }
    }
}

/// An append-only record of a recipe being prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationRecord {
    /// Unique record ID.
    pub id: PreparationId,
    /// Recipe prepared.
    pub recipe_id: RecipeId,
    /// Number of preparations made.
    pub amount: u32,
    /// When the preparation was committed.
    pub prepared_at: DateTime<Utc>,
}

/// Input for appending a preparation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPreparation {
    /// Recipe prepared.
    pub recipe_id: RecipeId,
    /// Number of preparations made.
    pub amount: u32,
    /// When the preparation was committed.
    pub prepared_at: DateTime<Utc>,
}

impl NewPreparation {
    /// Attach an ID, producing the stored record.
    #[must_use]
    pub fn with_id(self, id: PreparationId) -> PreparationRecord {
        PreparationRecord {
            id,
            recipe_id: self.recipe_id,
            amount: self.amount,
            prepared_at: self.prepared_at,
        }
    }
}
