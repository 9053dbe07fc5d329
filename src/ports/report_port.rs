//! Transaction log and equity curve sink port trait.

use crate::domain::error::QuantloopError;
use crate::domain::execution::Fill;
use crate::domain::portfolio::EquityPoint;

/// Receives every committed step. Both streams are append-only.
pub trait ReportPort {
    fn record_step(&mut self, fills: &[Fill], equity: &EquityPoint) -> Result<(), QuantloopError>;

    fn flush(&mut self) -> Result<(), QuantloopError>;
}
