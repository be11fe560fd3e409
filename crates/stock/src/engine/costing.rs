//! FIFO costing of consumption plans in the base currency.
//!
//! Each consumed portion is priced at its own lot's purchase price and
//! converted to RON. Figures are kept unrounded here; callers round once via
//! [`CostSummary::rounded`].

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use pantry_core::{CurrencyCode, IngredientId};

use crate::currency::{CurrencyError, CurrencyNormalizer};
use crate::models::{ConsumptionPlan, CostSummary};

/// Errors raised while costing a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostingError {
    /// An exchange rate could not be resolved.
    #[error(transparent)]
    Rate(#[from] CurrencyError),

    /// A cost does not fit in a decimal.
    #[error("cost of ingredient {0} overflows")]
    Overflow(IngredientId),
}

/// Sum a plan using already-resolved exchange rates.
///
/// `rates` maps foreign currencies to the amount of RON one unit buys. RON
/// amounts never need an entry.
///
/// # Errors
///
/// Returns `CostingError::Rate` if a step is priced in a currency missing
/// from `rates`, and `CostingError::Overflow` if a sum does not fit.
pub fn sum_plan(
    plan: &ConsumptionPlan,
    preparations: u32,
    rates: &HashMap<CurrencyCode, Decimal>,
) -> Result<CostSummary, CostingError> {
    let mut per_ingredient = BTreeMap::new();
    let mut total_cost = Decimal::ZERO;

    for (ingredient_id, steps) in plan {
        let mut ingredient_cost = Decimal::ZERO;
        for step in steps {
            let code = step.cost.currency_code;
            let rate = if code.is_base() {
                Decimal::ONE
            } else {
                rates
                    .get(&code)
                    .copied()
                    .ok_or(CurrencyError::UnknownCurrency(code))?
            };
            ingredient_cost = step
                .cost
                .amount
                .checked_mul(rate)
                .and_then(|cost| ingredient_cost.checked_add(cost))
                .ok_or(CostingError::Overflow(*ingredient_id))?;
        }
        per_ingredient.insert(*ingredient_id, ingredient_cost);
        total_cost = total_cost
            .checked_add(ingredient_cost)
            .ok_or(CostingError::Overflow(*ingredient_id))?;
    }

    let unit_cost = if preparations == 0 {
        Decimal::ZERO
    } else {
        total_cost / Decimal::from(preparations)
    };

    Ok(CostSummary {
        preparations,
        total_cost,
        unit_cost,
        per_ingredient,
        currency: CurrencyCode::RON,
    })
}

/// Cost a plan, resolving each distinct foreign currency once.
///
/// # Errors
///
/// Returns `CostingError` if a rate cannot be resolved or a sum overflows.
/// No partial summary is produced.
#[instrument(skip(plan, normalizer), fields(lots = plan.values().map(Vec::len).sum::<usize>()))]
pub async fn cost_plan(
    plan: &ConsumptionPlan,
    preparations: u32,
    normalizer: &CurrencyNormalizer,
) -> Result<CostSummary, CostingError> {
    let mut rates = HashMap::new();
    for step in plan.values().flatten() {
        let code = step.cost.currency_code;
        if code.is_base() || rates.contains_key(&code) {
            continue;
        }
        rates.insert(code, normalizer.rate_for(code).await?);
    }

    sum_plan(plan, preparations, &rates)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pantry_core::{IngredientId, Price, StockLotId, Unit};

    use super::*;
    use crate::currency::{RateCache, StaticRateSource};
    use crate::models::ConsumptionStep;

    fn step(lot: i32, ingredient: i32, cost: Decimal, currency: CurrencyCode) -> ConsumptionStep {
        ConsumptionStep {
            lot_id: StockLotId::new(lot),
            ingredient_id: IngredientId::new(ingredient),
            quantity: Decimal::ONE,
            unit: Unit::Kilogram,
            lot_quantity: Decimal::ONE,
            depletes_lot: true,
            cost: Price::new(cost, currency),
        }
    }

    fn fifo_plan() -> ConsumptionPlan {
        BTreeMap::from([(
            IngredientId::new(1),
            vec![
                step(1, 1, Decimal::new(6, 0), CurrencyCode::RON),
                step(2, 1, Decimal::new(4, 0), CurrencyCode::RON),
            ],
        )])
    }

    #[test]
    fn test_sum_plan_prices_each_lot() {
        let summary = sum_plan(&fifo_plan(), 3, &HashMap::new()).unwrap();
        assert_eq!(summary.total_cost, Decimal::new(10, 0));
        assert_eq!(summary.rounded().unit_cost, Decimal::new(333, 2));
        assert_eq!(summary.per_ingredient[&IngredientId::new(1)], Decimal::new(10, 0));
    }

    #[test]
    fn test_sum_plan_zero_preparations_has_zero_unit_cost() {
        let summary = sum_plan(&ConsumptionPlan::new(), 0, &HashMap::new()).unwrap();
        assert_eq!(summary, CostSummary::zero());
    }

    #[test]
    fn test_sum_plan_converts_foreign_currency() {
        let plan = BTreeMap::from([(
            IngredientId::new(1),
            vec![step(1, 1, Decimal::new(2, 0), CurrencyCode::EUR)],
        )]);
        let rates = HashMap::from([(CurrencyCode::EUR, Decimal::new(497, 2))]);
        let summary = sum_plan(&plan, 1, &rates).unwrap();
        assert_eq!(summary.total_cost, Decimal::new(994, 2));
    }

    #[test]
    fn test_sum_plan_missing_rate_fails() {
        let plan = BTreeMap::from([(
            IngredientId::new(1),
            vec![step(1, 1, Decimal::ONE, CurrencyCode::USD)],
        )]);
        assert_eq!(
            sum_plan(&plan, 1, &HashMap::new()),
            Err(CostingError::Rate(CurrencyError::UnknownCurrency(
                CurrencyCode::USD
            )))
        );
    }

    #[test]
    fn test_sum_plan_overflow_is_reported() {
        let plan = BTreeMap::from([(
            IngredientId::new(3),
            vec![
                step(1, 3, Decimal::MAX, CurrencyCode::RON),
                step(2, 3, Decimal::MAX, CurrencyCode::RON),
            ],
        )]);
        assert_eq!(
            sum_plan(&plan, 1, &HashMap::new()),
            Err(CostingError::Overflow(IngredientId::new(3)))
        );
    }

    #[tokio::test]
    async fn test_cost_plan_skips_source_for_base_currency() {
        let source = Arc::new(StaticRateSource::empty());
        let normalizer = CurrencyNormalizer::new(RateCache::new(source.clone()));
        let summary = cost_plan(&fifo_plan(), 3, &normalizer).await.unwrap();
        assert_eq!(summary.total_cost, Decimal::new(10, 0));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_cost_plan_resolves_each_currency_once() {
        let source = Arc::new(StaticRateSource::new([(
            CurrencyCode::EUR,
            Decimal::new(5, 0),
        )]));
        let normalizer = CurrencyNormalizer::new(RateCache::new(source.clone()));
        let plan = BTreeMap::from([
            (
                IngredientId::new(1),
                vec![step(1, 1, Decimal::ONE, CurrencyCode::EUR)],
            ),
            (
                IngredientId::new(2),
                vec![
                    step(2, 2, Decimal::new(2, 0), CurrencyCode::EUR),
                    step(3, 2, Decimal::new(3, 0), CurrencyCode::RON),
                ],
            ),
        ]);
        let summary = cost_plan(&plan, 1, &normalizer).await.unwrap();
        assert_eq!(summary.total_cost, Decimal::new(18, 0));
        assert_eq!(source.calls(), 1);
    }
}
