//! Pantry Stock - allocation, FIFO costing and preparation recording.
//!
//! Answers three questions about a recipe against the current stock lots:
//! how many times it can be prepared, what that costs in the base currency,
//! and whether `n` preparations can be reserved right now (consuming stock
//! atomically when they can).
//!
//! # Architecture
//!
//! - [`engine`] - Pure allocation and costing over snapshots of lots
//! - [`currency`] - Exchange rate sources, caching and normalization to RON
//! - [`db`] - The [`StockStore`] seam, with in-memory and `PostgreSQL` backends
//! - [`services`] - [`KitchenService`], the entry point for callers
//!
//! Shortages are reported, not raised: see [`Reservation`] and [`Quote`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod currency;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod retry;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, StockConfig};
pub use currency::{CurrencyError, CurrencyNormalizer, RateCache, RateSource};
pub use db::{MemoryStockStore, PantrySnapshot, StockStore, StoreError};
pub use engine::LotSortKey;
pub use error::ServiceError;
pub use models::{
    AllocationResult, CostSummary, LotListing, MaxPreparations, PreparationRecord, Quote,
    Reservation, Shortage,
};
pub use retry::RetryPolicy;
pub use services::KitchenService;
