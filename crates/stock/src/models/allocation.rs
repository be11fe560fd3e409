//! Allocation plans and the results returned to callers.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use pantry_core::{CurrencyCode, IngredientId, LotStatus, Price, RecipeId, StockLotId, Unit};

use super::{PreparationRecord, StockLot};

/// Per-ingredient consumption steps, each list ordered oldest lot first.
pub type ConsumptionPlan = BTreeMap<IngredientId, Vec<ConsumptionStep>>;

/// Quantity taken from one lot as part of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionStep {
    /// Lot consumed from.
    pub lot_id: StockLotId,
    /// Ingredient the lot holds.
    pub ingredient_id: IngredientId,
    /// Quantity consumed, in the base unit.
    pub quantity: Decimal,
    /// Base unit of `quantity`.
    pub unit: Unit,
    /// The same quantity expressed in the lot's own unit.
    pub lot_quantity: Decimal,
    /// Whether the step drains the lot entirely.
    pub depletes_lot: bool,
    /// Purchase cost of the consumed portion, in the lot's currency.
    pub cost: Price,
}

/// Quantity of an ingredient missing for a requested preparation count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortage {
    /// Ingredient that is short.
    pub ingredient_id: IngredientId,
    /// Ingredient display name.
    pub ingredient_name: String,
    /// Missing quantity, in `display_unit`.
    pub missing_quantity: Decimal,
    /// Unit the missing quantity is reported in.
    pub display_unit: Unit,
}

/// Outcome of allocating stock for a requested number of preparations.
///
/// Insufficient stock is an ordinary outcome: `shortages` lists what is
/// missing and `max_preparations` still reports what is achievable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationResult {
    /// Preparations requested.
    pub requested: u32,
    /// Preparations the eligible stock can cover.
    pub max_preparations: u32,
    /// Lot-by-lot plan for every ingredient that can cover the request.
    pub plan: ConsumptionPlan,
    /// Ingredients that cannot cover the request.
    pub shortages: Vec<Shortage>,
}

impl AllocationResult {
    /// Result for a recipe that cannot be prepared at all.
    #[must_use]
    pub const fn not_preparable(requested: u32) -> Self {
        Self {
            requested,
            max_preparations: 0,
            plan: BTreeMap::new(),
            shortages: Vec::new(),
        }
    }

    /// Whether the plan fully covers the requested count.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.requested > 0 && self.max_preparations >= self.requested && self.shortages.is_empty()
    }

    /// All consumption steps, ingredient by ingredient.
    pub fn steps(&self) -> impl Iterator<Item = &ConsumptionStep> {
        self.plan.values().flatten()
    }
}

/// Costs of a consumption plan in the base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Preparations the plan covers.
    pub preparations: u32,
    /// Total cost of all consumed portions.
    pub total_cost: Decimal,
    /// Cost of one preparation (`0` when `preparations` is `0`).
    pub unit_cost: Decimal,
    /// Total cost per ingredient.
    pub per_ingredient: BTreeMap<IngredientId, Decimal>,
    /// Currency every figure is expressed in.
    pub currency: CurrencyCode,
}

impl CostSummary {
    /// A summary with nothing consumed.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            preparations: 0,
            total_cost: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
            per_ingredient: BTreeMap::new(),
            currency: CurrencyCode::RON,
        }
    }

    /// Round every figure to 2 decimal places for reporting.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            preparations: self.preparations,
            total_cost: round_money(self.total_cost),
            unit_cost: round_money(self.unit_cost),
            per_ingredient: self
                .per_ingredient
                .iter()
                .map(|(id, cost)| (*id, round_money(*cost)))
                .collect(),
            currency: self.currency,
        }
    }
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// How many times a recipe can be prepared right now, and at what cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPreparations {
    /// Recipe queried.
    pub recipe_id: RecipeId,
    /// Preparations the eligible stock can cover.
    pub max_preparations: u32,
    /// Cost of consuming stock for all of them, rounded to 2 dp.
    pub total_cost: Decimal,
    /// Cost per preparation, rounded to 2 dp.
    pub unit_cost: Decimal,
    /// Currency of both figures.
    pub currency: CurrencyCode,
}

/// Read-only allocation and costing for a requested preparation count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Recipe quoted.
    pub recipe_id: RecipeId,
    /// Allocation against current stock.
    pub allocation: AllocationResult,
    /// Rounded cost, present only when the request is satisfiable.
    pub cost: Option<CostSummary>,
}

/// Outcome of a check-and-reserve request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    /// Recipe requested.
    pub recipe_id: RecipeId,
    /// Whether stock was consumed and the preparation recorded.
    pub success: bool,
    /// Itemized shortages when `success` is false.
    pub shortages: Vec<Shortage>,
    /// The appended history record when `success` is true.
    pub record: Option<PreparationRecord>,
}

impl Reservation {
    /// A reservation that consumed stock.
    #[must_use]
    pub const fn committed(record: PreparationRecord) -> Self {
        Self {
            recipe_id: record.recipe_id,
            success: true,
            shortages: Vec::new(),
            record: Some(record),
        }
    }

    /// A reservation refused for lack of stock.
    #[must_use]
    pub const fn rejected(recipe_id: RecipeId, shortages: Vec<Shortage>) -> Self {
        Self {
            recipe_id,
            success: false,
            shortages,
            record: None,
        }
    }
}

/// A lot together with its status at listing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotListing {
    #[serde(flatten)]
    pub lot: StockLot,
    pub status: LotStatus,
}
