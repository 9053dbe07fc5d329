//! Core domain types and logic.

pub mod ohlcv;
pub mod market_data;
pub mod universe;
pub mod indicator;
pub mod signal;
pub mod strategy;
pub mod order;
pub mod risk;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod pipeline;
pub mod metrics;
pub mod config;
pub mod error;
