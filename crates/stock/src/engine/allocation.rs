//! FIFO allocation of recipe requirements against lot pools.
//!
//! Every quantity is normalized to its base unit first. Each ingredient is
//! allocated independently: the achievable count for an ingredient is
//! `floor(available / per_preparation)` and the recipe's maximum is the
//! smallest of those. When an ingredient covers the requested count, its
//! lots are walked oldest first and the last lot touched is split if only
//! part of it is needed.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use pantry_core::{IngredientId, Unit, normalize};

use super::{AllocationError, LotPool};
use crate::models::{
    AllocationResult, ConsumptionStep, RecipeIngredientRequirement, Shortage, StockLot,
};

/// Per-preparation need for one ingredient, in its base unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientNeed {
    /// Ingredient required.
    pub ingredient_id: IngredientId,
    /// Base-unit quantity consumed by one preparation.
    pub per_preparation: Decimal,
    /// Base unit of `per_preparation`.
    pub base_unit: Unit,
}

/// Validate requirements and fold them into one need per ingredient.
///
/// Requirements naming the same ingredient are summed so its pool is only
/// allocated once. Order of first appearance is kept.
///
/// # Errors
///
/// Returns `AllocationError::MalformedRequest` if a quantity is not
/// positive, too small to express in its base unit, or if one ingredient is
/// required in incompatible units.
pub fn merge_requirements(
    requirements: &[RecipeIngredientRequirement],
) -> Result<Vec<IngredientNeed>, AllocationError> {
    let mut needs: Vec<IngredientNeed> = Vec::with_capacity(requirements.len());

    for requirement in requirements {
        if requirement.quantity <= Decimal::ZERO {
            return Err(AllocationError::MalformedRequest(format!(
                "ingredient {} requires a non-positive quantity ({} {})",
                requirement.ingredient_id, requirement.quantity, requirement.unit
            )));
        }

        let (per_preparation, _) = normalize(requirement.quantity, &requirement.unit);
        let base_unit = requirement.unit.base_unit();
        if per_preparation.is_zero() {
            return Err(AllocationError::MalformedRequest(format!(
                "ingredient {} quantity {} {} is too small to express in {base_unit}",
                requirement.ingredient_id, requirement.quantity, requirement.unit
            )));
        }

        match needs
            .iter_mut()
            .find(|need| need.ingredient_id == requirement.ingredient_id)
        {
            Some(need) if need.base_unit != base_unit => {
                return Err(AllocationError::MalformedRequest(format!(
                    "ingredient {} is required in both {} and {base_unit}",
                    requirement.ingredient_id, need.base_unit
                )));
            }
            Some(need) => {
                need.per_preparation = need
                    .per_preparation
                    .checked_add(per_preparation)
                    .ok_or_else(|| {
                        AllocationError::MalformedRequest(format!(
                            "ingredient {} quantity overflows",
                            requirement.ingredient_id
                        ))
                    })?;
            }
            None => needs.push(IngredientNeed {
                ingredient_id: requirement.ingredient_id,
                per_preparation,
                base_unit,
            }),
        }
    }

    Ok(needs)
}

/// Maximum number of preparations the pools can cover.
///
/// A recipe with no requirements yields `0`: an empty ingredient list marks
/// a recipe as not preparable, never as unlimited.
///
/// # Errors
///
/// Returns `AllocationError::MalformedRequest` for invalid requirements.
pub fn max_preparations(
    requirements: &[RecipeIngredientRequirement],
    pools: &HashMap<IngredientId, LotPool>,
) -> Result<u32, AllocationError> {
    let needs = merge_requirements(requirements)?;
    Ok(needs
        .iter()
        .map(|need| ingredient_max(available(pools, need), need.per_preparation))
        .min()
        .unwrap_or(0))
}

/// Allocate stock for `desired` preparations.
///
/// `None` means the recipe has no requirement list upstream and is rejected
/// with `RecipeNotFound`; `Some(&[])` is a recipe with no ingredients and is
/// reported as not preparable.
///
/// # Errors
///
/// Returns `AllocationError::RecipeNotFound` for `None` requirements and
/// `AllocationError::MalformedRequest` for `desired == 0` or invalid
/// requirements. Running short of stock is reported in the result.
pub fn allocate(
    requirements: Option<&[RecipeIngredientRequirement]>,
    desired: u32,
    pools: &HashMap<IngredientId, LotPool>,
) -> Result<AllocationResult, AllocationError> {
    let requirements = requirements.ok_or(AllocationError::RecipeNotFound)?;
    if desired == 0 {
        return Err(AllocationError::MalformedRequest(
            "desired preparations must be at least 1".to_string(),
        ));
    }

    let needs = merge_requirements(requirements)?;
    if needs.is_empty() {
        return Ok(AllocationResult::not_preparable(desired));
    }

    let desired_count = Decimal::from(desired);
    let mut result = AllocationResult {
        requested: desired,
        max_preparations: u32::MAX,
        plan: BTreeMap::new(),
        shortages: Vec::new(),
    };

    for need in &needs {
        let pool = pools.get(&need.ingredient_id);
        let available = available(pools, need);
        let achievable = ingredient_max(available, need.per_preparation);
        result.max_preparations = result.max_preparations.min(achievable);

        let target = need
            .per_preparation
            .checked_mul(desired_count)
            .ok_or_else(|| {
                AllocationError::MalformedRequest(format!(
                    "{desired} preparations of ingredient {} overflow",
                    need.ingredient_id
                ))
            })?;

        match pool {
            Some(pool) if achievable >= desired => {
                let steps = consume_fifo(pool, need, target)?;
                debug!(
                    ingredient_id = %need.ingredient_id,
                    %target,
                    lots = steps.len(),
                    "Planned FIFO consumption"
                );
                result.plan.insert(need.ingredient_id, steps);
            }
            _ => {
                let missing = (target - available).normalize();
                debug!(
                    ingredient_id = %need.ingredient_id,
                    %available,
                    %target,
                    %missing,
                    "Ingredient short for requested preparations"
                );
                result.shortages.push(Shortage {
                    ingredient_id: need.ingredient_id,
                    ingredient_name: pool.map_or_else(
                        || format!("ingredient #{}", need.ingredient_id),
                        |pool| pool.ingredient().name.clone(),
                    ),
                    missing_quantity: missing,
                    display_unit: need.base_unit.display_unit(),
                });
            }
        }
    }

    Ok(result)
}

fn available(pools: &HashMap<IngredientId, LotPool>, need: &IngredientNeed) -> Decimal {
    pools
        .get(&need.ingredient_id)
        .map_or(Decimal::ZERO, |pool| pool.available_in(&need.base_unit))
}

fn ingredient_max(available: Decimal, per_preparation: Decimal) -> u32 {
    if per_preparation <= Decimal::ZERO {
        return 0;
    }
    available
        .checked_div(per_preparation)
        .map_or(u32::MAX, |count| count.floor().to_u32().unwrap_or(u32::MAX))
}

/// Walk lots oldest first until `target` base units are covered.
fn consume_fifo(
    pool: &LotPool,
    need: &IngredientNeed,
    target: Decimal,
) -> Result<Vec<ConsumptionStep>, AllocationError> {
    let overflow = |lot: &StockLot| {
        AllocationError::MalformedRequest(format!(
            "cost of lot {} for ingredient {} overflows",
            lot.id, need.ingredient_id
        ))
    };
    let mut steps = Vec::new();
    let mut outstanding = target;

    for lot in pool.lots_in(&need.base_unit) {
        if outstanding <= Decimal::ZERO {
            break;
        }

        let lot_base = lot.base_quantity();
        let (taken, lot_quantity, depletes_lot) = if lot_base <= outstanding {
            (lot_base, lot.quantity, true)
        } else {
            let lot_quantity = lot.unit.from_base(outstanding).ok_or_else(|| overflow(lot))?;
            (outstanding, lot_quantity, false)
        };
        let cost = lot
            .unit_price
            .checked_times(lot_quantity)
            .ok_or_else(|| overflow(lot))?;

        steps.push(ConsumptionStep {
            lot_id: lot.id,
            ingredient_id: lot.ingredient_id,
            quantity: taken,
            unit: need.base_unit.clone(),
            lot_quantity,
            depletes_lot,
            cost,
        });
        outstanding -= taken;
    }

    Ok(steps)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pantry_core::{CurrencyCode, Price, StockLotId};

    use super::*;
    use crate::models::{Ingredient, StockLot};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    fn ingredient(id: i32, name: &str) -> Ingredient {
        Ingredient {
            id: IngredientId::new(id),
            name: name.to_string(),
            category_id: None,
        }
    }

    fn lot(id: i32, ingredient: i32, quantity: Decimal, unit: Unit, price: Decimal) -> StockLot {
        StockLot {
            id: StockLotId::new(id),
            ingredient_id: IngredientId::new(ingredient),
            quantity,
            unit,
            unit_price: Price::new(price, CurrencyCode::RON),
            purchased_at: now() - Duration::days(3),
            expires_at: now() + Duration::days(10),
            consumed_at: None,
            split_from: None,
        }
    }

    fn pools(entries: Vec<(Ingredient, Vec<StockLot>)>) -> HashMap<IngredientId, LotPool> {
        entries
            .into_iter()
            .map(|(ingredient, lots)| (ingredient.id, LotPool::new(ingredient, lots, now())))
            .collect()
    }

    fn requirement(ingredient: i32, quantity: Decimal, unit: Unit) -> RecipeIngredientRequirement {
        RecipeIngredientRequirement::new(IngredientId::new(ingredient), quantity, unit)
    }

    fn butter_pools() -> HashMap<IngredientId, LotPool> {
        pools(vec![(
            ingredient(1, "Butter"),
            vec![
                lot(1, 1, Decimal::new(2, 0), Unit::Kilogram, Decimal::new(3, 0)),
                lot(2, 1, Decimal::new(5, 0), Unit::Kilogram, Decimal::new(4, 0)),
            ],
        )])
    }

    #[test]
    fn test_fifo_takes_oldest_lot_first_and_splits_the_next() {
        let reqs = vec![requirement(1, Decimal::ONE, Unit::Kilogram)];
        let result = allocate(Some(reqs.as_slice()), 3, &butter_pools()).unwrap();

        assert!(result.is_satisfied());
        assert_eq!(result.max_preparations, 7);
        let steps = &result.plan[&IngredientId::new(1)];
        assert_eq!(steps.len(), 2);

        assert_eq!(steps[0].lot_id, StockLotId::new(1));
        assert_eq!(steps[0].quantity, Decimal::new(2, 0));
        assert!(steps[0].depletes_lot);
        assert_eq!(steps[0].cost.amount, Decimal::new(6, 0));

        assert_eq!(steps[1].lot_id, StockLotId::new(2));
        assert_eq!(steps[1].quantity, Decimal::ONE);
        assert!(!steps[1].depletes_lot);
        assert_eq!(steps[1].cost.amount, Decimal::new(4, 0));
    }

    #[test]
    fn test_exact_fit_depletes_without_split() {
        let reqs = vec![requirement(1, Decimal::ONE, Unit::Kilogram)];
        let result = allocate(Some(reqs.as_slice()), 2, &butter_pools()).unwrap();
        let steps = &result.plan[&IngredientId::new(1)];
        assert_eq!(steps.len(), 1);
        assert!(steps[0].depletes_lot);
    }

    #[test]
    fn test_shortage_reports_missing_quantity_in_display_unit() {
        let pools = pools(vec![(
            ingredient(1, "Butter"),
            vec![lot(1, 1, Decimal::new(2, 0), Unit::Kilogram, Decimal::new(3, 0))],
        )]);
        let reqs = vec![requirement(1, Decimal::new(1000, 0), Unit::Gram)];
        let result = allocate(Some(reqs.as_slice()), 5, &pools).unwrap();

        assert!(!result.is_satisfied());
        assert_eq!(result.max_preparations, 2);
        assert!(result.plan.is_empty());
        assert_eq!(result.shortages.len(), 1);
        let shortage = &result.shortages[0];
        assert_eq!(shortage.ingredient_name, "Butter");
        assert_eq!(shortage.missing_quantity, Decimal::new(3, 0));
        assert_eq!(shortage.display_unit, Unit::Kilogram);
    }

    #[test]
    fn test_no_stock_reports_full_target() {
        let pools = pools(vec![(ingredient(1, "Milk"), vec![])]);
        let reqs = vec![requirement(1, Decimal::new(250, 0), Unit::Milliliter)];
        let result = allocate(Some(reqs.as_slice()), 4, &pools).unwrap();

        assert_eq!(result.max_preparations, 0);
        assert_eq!(result.shortages[0].missing_quantity, Decimal::ONE);
        assert_eq!(result.shortages[0].display_unit, Unit::Liter);
    }

    #[test]
    fn test_missing_pool_counts_as_no_stock() {
        let reqs = vec![requirement(9, Decimal::ONE, Unit::Kilogram)];
        let result = allocate(Some(reqs.as_slice()), 1, &HashMap::new()).unwrap();
        assert_eq!(result.max_preparations, 0);
        assert_eq!(result.shortages[0].ingredient_name, "ingredient #9");
    }

    #[test]
    fn test_empty_requirements_are_not_preparable() {
        let result = allocate(Some(&[][..]), 1, &butter_pools()).unwrap();
        assert_eq!(result.max_preparations, 0);
        assert!(!result.is_satisfied());
        assert_eq!(max_preparations(&[], &butter_pools()).unwrap(), 0);
    }

    #[test]
    fn test_absent_requirements_are_rejected() {
        assert_eq!(
            allocate(None, 1, &butter_pools()),
            Err(AllocationError::RecipeNotFound)
        );
    }

    #[test]
    fn test_zero_desired_is_malformed() {
        let reqs = vec![requirement(1, Decimal::ONE, Unit::Kilogram)];
        assert!(matches!(
            allocate(Some(reqs.as_slice()), 0, &butter_pools()),
            Err(AllocationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_overflowing_lot_cost_is_malformed() {
        let pools = pools(vec![(
            ingredient(1, "Saffron"),
            vec![lot(1, 1, Decimal::new(2, 0), Unit::Kilogram, Decimal::MAX)],
        )]);
        let reqs = vec![requirement(1, Decimal::ONE, Unit::Kilogram)];
        assert!(matches!(
            allocate(Some(reqs.as_slice()), 2, &pools),
            Err(AllocationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_non_positive_quantity_is_malformed() {
        let reqs = vec![requirement(1, Decimal::ZERO, Unit::Kilogram)];
        assert!(matches!(
            allocate(Some(reqs.as_slice()), 1, &butter_pools()),
            Err(AllocationError::MalformedRequest(_))
        ));
        let reqs = vec![requirement(1, Decimal::NEGATIVE_ONE, Unit::Kilogram)];
        assert!(matches!(
            max_preparations(&reqs, &butter_pools()),
            Err(AllocationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_duplicate_requirements_are_merged() {
        let reqs = vec![
            requirement(1, Decimal::new(500, 0), Unit::Gram),
            requirement(1, Decimal::new(5, 1), Unit::Kilogram),
        ];
        assert_eq!(max_preparations(&reqs, &butter_pools()).unwrap(), 7);
    }

    #[test]
    fn test_incompatible_duplicate_units_are_malformed() {
        let reqs = vec![
            requirement(1, Decimal::ONE, Unit::Kilogram),
            requirement(1, Decimal::ONE, Unit::Liter),
        ];
        assert!(matches!(
            merge_requirements(&reqs),
            Err(AllocationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_max_is_minimum_across_ingredients() {
        let pools = pools(vec![
            (
                ingredient(1, "Flour"),
                vec![lot(1, 1, Decimal::new(10, 0), Unit::Kilogram, Decimal::ONE)],
            ),
            (
                ingredient(2, "Eggs"),
                vec![lot(2, 2, Decimal::new(7, 0), Unit::parse("buc"), Decimal::ONE)],
            ),
        ]);
        let reqs = vec![
            requirement(1, Decimal::new(500, 0), Unit::Gram),
            requirement(2, Decimal::new(2, 0), Unit::parse("buc")),
        ];
        assert_eq!(max_preparations(&reqs, &pools).unwrap(), 3);
    }

    #[test]
    fn test_partial_gram_lot_split_keeps_lot_unit() {
        let pools = pools(vec![(
            ingredient(1, "Sugar"),
            vec![lot(1, 1, Decimal::new(800, 0), Unit::Gram, Decimal::new(1, 2))],
        )]);
        let reqs = vec![requirement(1, Decimal::new(300, 0), Unit::Gram)];
        let result = allocate(Some(reqs.as_slice()), 2, &pools).unwrap();
        let step = &result.plan[&IngredientId::new(1)][0];

        assert_eq!(step.quantity, Decimal::new(6, 1));
        assert_eq!(step.unit, Unit::Kilogram);
        assert_eq!(step.lot_quantity, Decimal::new(600, 0));
        assert!(!step.depletes_lot);
        assert_eq!(step.cost.amount, Decimal::new(6, 0));
    }

    #[test]
    fn test_allocation_is_idempotent() {
        let reqs = vec![requirement(1, Decimal::ONE, Unit::Kilogram)];
        let pools = butter_pools();
        let first = allocate(Some(reqs.as_slice()), 3, &pools).unwrap();
        let second = allocate(Some(reqs.as_slice()), 3, &pools).unwrap();
        assert_eq!(first, second);
    }
}
