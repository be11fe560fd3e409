//! Eligible stock for one ingredient, oldest intake first.
//!
//! The FIFO order is load-bearing: it decides which purchase price is
//! attributed to which preparation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use pantry_core::Unit;

use crate::models::{Ingredient, StockLot};

/// Filter lots down to the ones eligible at `as_of`, ordered oldest intake
/// first.
#[must_use]
pub fn eligible_lots(
    lots: impl IntoIterator<Item = StockLot>,
    as_of: DateTime<Utc>,
) -> Vec<StockLot> {
    let mut eligible: Vec<StockLot> = lots
        .into_iter()
        .filter(|lot| lot.is_eligible(as_of))
        .collect();
    LotSortKey::Intake.sort(&mut eligible);
    eligible
}

/// Snapshot of one ingredient's eligible lots.
#[derive(Debug, Clone)]
pub struct LotPool {
    ingredient: Ingredient,
    lots: Vec<StockLot>,
}

impl LotPool {
    /// Build a pool from whatever the store returned, re-applying the
    /// eligibility filter and FIFO order.
    #[must_use]
    pub fn new(
        ingredient: Ingredient,
        lots: impl IntoIterator<Item = StockLot>,
        as_of: DateTime<Utc>,
    ) -> Self {
        let id = ingredient.id;
        let lots = eligible_lots(lots.into_iter().filter(|lot| lot.ingredient_id == id), as_of);
        Self { ingredient, lots }
    }

    #[must_use]
    pub const fn ingredient(&self) -> &Ingredient {
        &self.ingredient
    }

    /// Eligible lots, oldest intake first.
    #[must_use]
    pub fn lots(&self) -> &[StockLot] {
        &self.lots
    }

    /// Lots whose quantities can be expressed in `base_unit`, in FIFO order.
    ///
    /// A lot stocked in another measurement family cannot be summed with the
    /// requirement and is skipped.
    pub fn lots_in<'a>(&'a self, base_unit: &'a Unit) -> impl Iterator<Item = &'a StockLot> + 'a {
        self.lots.iter().filter(move |lot| {
            let compatible = lot.unit.base_unit() == *base_unit;
            if !compatible {
                warn!(
                    ingredient_id = %self.ingredient.id,
                    lot_id = %lot.id,
                    lot_unit = %lot.unit,
                    required_unit = %base_unit,
                    "Skipping lot stocked in an incompatible unit"
                );
            }
            compatible
        })
    }

    /// Sum of eligible quantity in `base_unit`.
    #[must_use]
    pub fn available_in(&self, base_unit: &Unit) -> Decimal {
        self.lots_in(base_unit).map(StockLot::base_quantity).sum()
    }
}

/// Sort orders for stock listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LotSortKey {
    /// Intake order (lot ID ascending), the FIFO consumption order.
    #[default]
    Intake,
    /// Purchase date ascending.
    PurchaseDate,
    /// Expiry ascending, soonest first.
    Expiry,
    /// Remaining base quantity descending, largest first.
    Quantity,
}

impl LotSortKey {
    /// Compare two lots under this key. Ties fall back to intake order.
    #[must_use]
    pub fn compare(self, a: &StockLot, b: &StockLot) -> Ordering {
        let primary = match self {
            Self::Intake => Ordering::Equal,
            Self::PurchaseDate => a.purchased_at.cmp(&b.purchased_at),
            Self::Expiry => a.expires_at.cmp(&b.expires_at),
            Self::Quantity => b.base_quantity().cmp(&a.base_quantity()),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    pub fn sort(self, lots: &mut [StockLot]) {
        lots.sort_by(|a, b| self.compare(a, b));
    }
}

impl std::fmt::Display for LotSortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intake => write!(f, "intake"),
            Self::PurchaseDate => write!(f, "purchase"),
            Self::Expiry => write!(f, "expiry"),
            Self::Quantity => write!(f, "quantity"),
        }
    }
}

impl std::str::FromStr for LotSortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(Self::Intake),
            "purchase" => Ok(Self::PurchaseDate),
            "expiry" => Ok(Self::Expiry),
            "quantity" => Ok(Self::Quantity),
            _ => Err(format!("invalid sort key: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pantry_core::{CurrencyCode, IngredientId, Price, StockLotId};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn flour() -> Ingredient {
        Ingredient {
            id: IngredientId::new(1),
            name: "Flour".to_string(),
            category_id: None,
        }
    }

    fn lot(id: i32, quantity: i64, unit: Unit, expires_in_days: i64) -> StockLot {
        StockLot {
            id: StockLotId::new(id),
            ingredient_id: IngredientId::new(1),
            quantity: Decimal::new(quantity, 0),
            unit,
            unit_price: Price::new(Decimal::ONE, CurrencyCode::RON),
            purchased_at: now() - Duration::days(i64::from(10 - id)),
            expires_at: now() + Duration::days(expires_in_days),
            consumed_at: None,
            split_from: None,
        }
    }

    #[test]
    fn test_pool_orders_by_intake() {
        let pool = LotPool::new(
            flour(),
            vec![
                lot(3, 1, Unit::Kilogram, 5),
                lot(1, 1, Unit::Kilogram, 5),
                lot(2, 1, Unit::Kilogram, 5),
            ],
            now(),
        );
        let ids: Vec<i32> = pool.lots().iter().map(|l| l.id.as_i32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_pool_excludes_expired_and_consumed() {
        let mut consumed = lot(2, 4, Unit::Kilogram, 5);
        consumed.consumed_at = Some(now() - Duration::hours(1));
        let pool = LotPool::new(
            flour(),
            vec![
                lot(1, 4, Unit::Kilogram, 0),
                consumed,
                lot(3, 0, Unit::Kilogram, 5),
                lot(4, 2, Unit::Kilogram, 1),
            ],
            now(),
        );
        assert_eq!(pool.lots().len(), 1);
        assert_eq!(pool.lots()[0].id, StockLotId::new(4));
    }

    #[test]
    fn test_pool_drops_other_ingredients() {
        let mut sugar = lot(5, 3, Unit::Kilogram, 5);
        sugar.ingredient_id = IngredientId::new(2);
        let pool = LotPool::new(flour(), vec![sugar], now());
        assert!(pool.lots().is_empty());
    }

    #[test]
    fn test_available_in_mixes_grams_and_kilograms() {
        let pool = LotPool::new(
            flour(),
            vec![lot(1, 500, Unit::Gram, 5), lot(2, 2, Unit::Kilogram, 5)],
            now(),
        );
        assert_eq!(pool.available_in(&Unit::Kilogram), Decimal::new(25, 1));
    }

    #[test]
    fn test_available_in_skips_other_families() {
        let pool = LotPool::new(
            flour(),
            vec![lot(1, 2, Unit::Liter, 5), lot(2, 2, Unit::Kilogram, 5)],
            now(),
        );
        assert_eq!(pool.available_in(&Unit::Kilogram), Decimal::new(2, 0));
    }

    #[test]
    fn test_sort_by_expiry_then_intake() {
        let mut lots = vec![
            lot(1, 1, Unit::Kilogram, 9),
            lot(2, 1, Unit::Kilogram, 3),
            lot(3, 1, Unit::Kilogram, 3),
        ];
        LotSortKey::Expiry.sort(&mut lots);
        let ids: Vec<i32> = lots.iter().map(|l| l.id.as_i32()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_by_quantity_uses_base_units() {
        let mut lots = vec![lot(1, 900, Unit::Gram, 5), lot(2, 2, Unit::Kilogram, 5)];
        LotSortKey::Quantity.sort(&mut lots);
        assert_eq!(lots[0].id, StockLotId::new(2));
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!("expiry".parse::<LotSortKey>().unwrap(), LotSortKey::Expiry);
        assert_eq!(
            "purchase".parse::<LotSortKey>().unwrap(),
            LotSortKey::PurchaseDate
        );
        assert!("name".parse::<LotSortKey>().is_err());
    }
}
