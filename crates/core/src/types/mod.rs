//! Core types for Pantry.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod currency;
pub mod id;
pub mod price;
pub mod status;
pub mod unit;

pub use currency::{CurrencyCode, CurrencyCodeError};
pub use id::*;
pub use price::Price;
pub use status::LotStatus;
pub use unit::{MeasureFamily, Unit, normalize};
