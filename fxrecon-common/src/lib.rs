//! # FxRecon Common Library
//!
//! Shared code for the FX trade reconciliation services including:
//! - Domain models (trades, extracted trades, matches, tenants)
//! - Event types (SystemEvent) and the in-process EventBus
//! - Canonical field normalisation (strings, dates, decimals)
//! - Common error types

pub mod error;
pub mod events;
pub mod fields;
pub mod model;

pub use error::{Error, Result};
