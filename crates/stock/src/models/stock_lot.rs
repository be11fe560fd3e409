//! Ingredient and stock lot models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{CategoryId, IngredientId, LotStatus, Price, StockLotId, Unit};

/// An ingredient that can be stocked and used by recipes.
///
/// Immutable once referenced by a lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Unique ingredient ID.
    pub id: IngredientId,
    /// Display name.
    pub name: String,
    /// Optional category reference.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// One purchase batch of one ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    /// Unique lot ID. Lower IDs were taken in earlier.
    pub id: StockLotId,
    /// Ingredient this lot holds.
    pub ingredient_id: IngredientId,
    /// Quantity remaining, expressed in `unit`.
    pub quantity: Decimal,
    /// Unit of measure the lot was stocked in.
    pub unit: Unit,
    /// Purchase price of one `unit`, in the purchase currency.
    pub unit_price: Price,
    /// When the lot was purchased.
    pub purchased_at: DateTime<Utc>,
    /// When the lot expires.
    pub expires_at: DateTime<Utc>,
    /// When the lot was consumed (`None` while still available).
    #[serde(default)]
    pub consumed_at: Option<DateTime<Utc>>,
    /// Lot this record was split from when only part of it was consumed.
    #[serde(default)]
    pub split_from: Option<StockLotId>,
}

impl StockLot {
    /// Whether the lot can be allocated at `as_of`.
    #[must_use]
    pub fn is_eligible(&self, as_of: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > as_of && self.quantity > Decimal::ZERO
    }

    /// Availability of the lot at `as_of`.
    #[must_use]
    pub fn status(&self, as_of: DateTime<Utc>) -> LotStatus {
        if self.consumed_at.is_some() {
            LotStatus::Consumed
        } else if self.expires_at <= as_of {
            LotStatus::Expired
        } else if self.quantity <= Decimal::ZERO {
            LotStatus::Depleted
        } else {
            LotStatus::Available
        }
    }

    /// Remaining quantity in the lot's base unit.
    #[must_use]
    pub fn base_quantity(&self) -> Decimal {
        self.unit.to_base(self.quantity)
    }
}

/// Input for inserting a stock lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockLot {
    /// Ingredient this lot holds.
    pub ingredient_id: IngredientId,
    /// Quantity, expressed in `unit`.
    pub quantity: Decimal,
    /// Unit of measure.
    pub unit: Unit,
    /// Purchase price of one `unit`.
    pub unit_price: Price,
    /// When the lot was purchased.
    pub purchased_at: DateTime<Utc>,
    /// When the lot expires.
    pub expires_at: DateTime<Utc>,
    /// Set for records that are created already consumed.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Provenance for consumed-portion records.
    pub split_from: Option<StockLotId>,
}

impl NewStockLot {
    /// Attach an ID, producing the stored lot.
    #[must_use]
    pub fn with_id(self, id: StockLotId) -> StockLot {
        StockLot {
            id,
            ingredient_id: self.ingredient_id,
            quantity: self.quantity,
            unit: self.unit,
            unit_price: self.unit_price,
            purchased_at: self.purchased_at,
            expires_at: self.expires_at,
            consumed_at: self.consumed_at,
            split_from: self.split_from,
        }
    }
}
