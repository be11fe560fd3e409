//! Errors surfaced to callers of the kitchen service.
//!
//! Running short of stock is not an error. It is reported through
//! [`Reservation`](crate::models::Reservation) and
//! [`Quote`](crate::models::Quote).

use thiserror::Error;

use pantry_core::{IngredientId, RecipeId};

use crate::currency::CurrencyError;
use crate::db::StoreError;
use crate::engine::{AllocationError, CostingError};
use crate::models::Shortage;

/// Errors returned by [`KitchenService`](crate::services::KitchenService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The recipe does not exist.
    #[error("recipe {0} not found")]
    RecipeNotFound(RecipeId),

    /// The ingredient does not exist.
    #[error("ingredient {0} not found")]
    IngredientNotFound(IngredientId),

    /// The request or the recipe's requirements are invalid.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A purchase price could not be converted to the base currency.
    #[error("exchange rate unavailable: {0}")]
    RateUnavailable(#[from] CurrencyError),

    /// Stock changed between planning and commit and no longer covers the
    /// request. Nothing was consumed.
    #[error("stock for recipe {recipe_id} changed during commit, please retry")]
    ConcurrentModification {
        recipe_id: RecipeId,
        shortages: Vec<Shortage>,
    },

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CostingError> for ServiceError {
    fn from(err: CostingError) -> Self {
        match err {
            CostingError::Rate(err) => Self::RateUnavailable(err),
            overflow @ CostingError::Overflow(_) => Self::MalformedRequest(overflow.to_string()),
        }
    }
}

impl ServiceError {
    /// Attach the recipe to an allocation error.
    #[must_use]
    pub fn from_allocation(err: AllocationError, recipe_id: RecipeId) -> Self {
        match err {
            AllocationError::RecipeNotFound => Self::RecipeNotFound(recipe_id),
            AllocationError::MalformedRequest(reason) => Self::MalformedRequest(reason),
        }
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification { .. } => true,
            Self::RateUnavailable(err) => err.is_transient(),
            Self::Store(err) => err.is_transient(),
            Self::RecipeNotFound(_) | Self::IngredientNotFound(_) | Self::MalformedRequest(_) => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pantry_core::CurrencyCode;

    use super::*;

    #[test]
    fn test_allocation_errors_carry_recipe() {
        let err = ServiceError::from_allocation(AllocationError::RecipeNotFound, RecipeId::new(4));
        assert!(matches!(err, ServiceError::RecipeNotFound(id) if id == RecipeId::new(4)));
        assert_eq!(err.to_string(), "recipe 4 not found");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            ServiceError::ConcurrentModification {
                recipe_id: RecipeId::new(1),
                shortages: vec![],
            }
            .is_retryable()
        );
        assert!(ServiceError::Store(StoreError::Unavailable("down".to_string())).is_retryable());
        assert!(
            !ServiceError::RateUnavailable(CurrencyError::UnknownCurrency(CurrencyCode::USD))
                .is_retryable()
        );
        assert!(!ServiceError::MalformedRequest("zero".to_string()).is_retryable());
    }

    #[test]
    fn test_costing_errors_map_to_service_errors() {
        let err = ServiceError::from(CostingError::Overflow(IngredientId::new(2)));
        assert!(matches!(err, ServiceError::MalformedRequest(ref reason) if reason.contains('2')));

        let err = ServiceError::from(CostingError::Rate(CurrencyError::UnknownCurrency(
            CurrencyCode::EUR,
        )));
        assert!(matches!(
            err,
            ServiceError::RateUnavailable(CurrencyError::UnknownCurrency(CurrencyCode::EUR))
        ));
    }
}
