//! Market data access port trait.

use crate::domain::error::QuantloopError;
use crate::domain::ohlcv::MarketRecord;
use chrono::NaiveDateTime;

/// Supplies records for a bounded time range. Implementations must return
/// each instrument's records in strictly increasing timestamp order.
pub trait DataPort {
    fn fetch_records(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MarketRecord>, QuantloopError>;

    fn list_instruments(&self) -> Result<Vec<String>, QuantloopError>;

    fn data_range(
        &self,
        instrument: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, QuantloopError>;
}
