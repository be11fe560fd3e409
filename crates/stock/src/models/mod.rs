//! Domain models for stock allocation.
//!
//! - [`stock_lot`] - Ingredients and the purchase lots they are stocked in
//! - [`recipe`] - Recipe requirements and preparation history
//! - [`allocation`] - Consumption plans, shortages and outbound results

pub mod allocation;
pub mod recipe;
pub mod stock_lot;

pub use allocation::{
    AllocationResult, ConsumptionPlan, ConsumptionStep, CostSummary, LotListing, MaxPreparations,
    Quote, Reservation, Shortage,
};
pub use recipe::{NewPreparation, PreparationRecord, Recipe, RecipeIngredientRequirement};
pub use stock_lot::{Ingredient, NewStockLot, StockLot};
