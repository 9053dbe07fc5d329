//! Rate-of-change momentum.
//!
//! strength = position_weight * clamp(roc(period) / full_scale, -1, 1), so a
//! move of `full_scale` over `period` records commits the full weight.

use std::collections::HashMap;

use crate::domain::error::QuantloopError;
use crate::domain::indicator::RollingCloses;
use crate::domain::market_data::MarketWindow;
use crate::domain::portfolio::PortfolioState;
use crate::domain::signal::{SignalGenerator, SignalMap};

use super::{collect_signals, validate_weight, SeenCursor};

#[derive(Debug, Clone)]
pub struct Momentum {
    period: usize,
    full_scale: f64,
    position_weight: f64,
    long_only: bool,
    cursor: SeenCursor,
    closes: HashMap<String, RollingCloses>,
}

impl Momentum {
    pub fn new(
        period: usize,
        full_scale: f64,
        position_weight: f64,
        long_only: bool,
    ) -> Result<Self, QuantloopError> {
        if period == 0 {
            return Err(QuantloopError::invalid(
                "strategy",
                "period",
                "period must be positive",
            ));
        }
        if !(full_scale > 0.0 && full_scale.is_finite()) {
            return Err(QuantloopError::invalid(
                "strategy",
                "full_scale",
                "full_scale must be positive",
            ));
        }
        validate_weight(position_weight)?;

        Ok(Self {
            period,
            full_scale,
            position_weight,
            long_only,
            cursor: SeenCursor::default(),
            closes: HashMap::new(),
        })
    }
}

impl SignalGenerator for Momentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn min_lookback(&self) -> usize {
        self.period + 1
    }

    fn generate(
        &mut self,
        window: &MarketWindow<'_>,
        _state: &PortfolioState,
    ) -> Result<SignalMap, QuantloopError> {
        let capacity = self.period + 1;
        let (full_scale, weight, long_only) = (self.full_scale, self.position_weight, self.long_only);
        let closes = &mut self.closes;

        collect_signals(window, &mut self.cursor, capacity, |instrument, fresh| {
            let buffer = closes
                .entry(instrument.to_string())
                .or_insert_with(|| RollingCloses::new(capacity));
            for record in fresh {
                buffer.update(record.close);
            }
            let scaled = (buffer.rate_of_change()? / full_scale).clamp(-1.0, 1.0);
            let strength = weight * scaled;
            Some(if long_only { strength.max(0.0) } else { strength })
        })
    }
}
