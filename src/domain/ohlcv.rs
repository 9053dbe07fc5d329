//! Market record representation.

use chrono::NaiveDateTime;

/// One price/volume bar for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecord {
    pub instrument_id: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl MarketRecord {
    /// Checks the bar is internally consistent: positive finite prices and
    /// `low <= open, close <= high`.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        self.low <= self.high
            && self.open >= self.low
            && self.open <= self.high
            && self.close >= self.low
            && self.close <= self.high
    }
}
