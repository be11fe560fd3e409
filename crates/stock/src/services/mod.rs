//! Outbound operations over the store, engine and currency normalizer.
//!
//! - [`kitchen::KitchenService`] - Max preparations, quotes, check-and-reserve
//! - [`recorder::PreparationRecorder`] - Atomic commit of a consumption plan

pub mod kitchen;
pub mod recorder;

use std::collections::HashMap;

use pantry_core::{IngredientId, RecipeId};

use crate::models::{Ingredient, RecipeIngredientRequirement};

pub use kitchen::KitchenService;
pub use recorder::PreparationRecorder;

/// A recipe's requirements together with the ingredients they name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeContext {
    pub recipe_id: RecipeId,
    pub requirements: Vec<RecipeIngredientRequirement>,
    pub ingredients: HashMap<IngredientId, Ingredient>,
}

impl RecipeContext {
    /// Distinct ingredients the recipe touches, in ID order.
    #[must_use]
    pub fn ingredient_ids(&self) -> Vec<IngredientId> {
        let mut ids: Vec<IngredientId> = self.ingredients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
