//! Pure allocation and costing over snapshots of stock.
//!
//! Nothing in this module touches the store. [`pool`] and [`allocation`] are
//! synchronous; [`costing`] only awaits exchange-rate lookups, which it
//! resolves before any arithmetic.

pub mod allocation;
pub mod costing;
pub mod pool;

use thiserror::Error;

pub use allocation::{IngredientNeed, allocate, max_preparations, merge_requirements};
pub use costing::{CostingError, cost_plan, sum_plan};
pub use pool::{LotPool, LotSortKey, eligible_lots};

/// Errors raised by the allocation engine.
///
/// Running short of stock is not an error; see
/// [`AllocationResult::shortages`](crate::models::AllocationResult::shortages).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// No requirement list exists for the recipe.
    #[error("recipe not found")]
    RecipeNotFound,

    /// The request or the recipe's requirements are invalid.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}
