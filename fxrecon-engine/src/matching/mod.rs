//! Trade matching
//!
//! Scoring, field comparison and the counterparty domain table.

pub mod compare;
pub mod counterparty;
pub mod engine;
