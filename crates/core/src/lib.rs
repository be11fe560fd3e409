//! Pantry Core - Shared types library.
//!
//! This crate provides common types used across all Pantry components:
//! - `stock` - Stock allocation, costing and preparation recording
//! - `cli` - Command-line tools over a pantry snapshot
//!
//! # Architecture
//!
//! The core crate contains only types and pure conversions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, currencies,
//!   units of measure and lot statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
