//! Simple moving average crossover.
//!
//! Long `position_weight` while SMA(short) is above SMA(long), short (or
//! flat when `long_only`) while it is below. Warmup: `long_period` records.

use std::collections::HashMap;

use crate::domain::error::QuantloopError;
use crate::domain::indicator::RollingMean;
use crate::domain::market_data::MarketWindow;
use crate::domain::portfolio::PortfolioState;
use crate::domain::signal::{SignalGenerator, SignalMap};

use super::{collect_signals, validate_weight, SeenCursor};

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    short_period: usize,
    long_period: usize,
    position_weight: f64,
    long_only: bool,
    cursor: SeenCursor,
    averages: HashMap<String, (RollingMean, RollingMean)>,
}

impl SmaCrossover {
    pub fn new(
        short_period: usize,
        long_period: usize,
        position_weight: f64,
        long_only: bool,
    ) -> Result<Self, QuantloopError> {
        if short_period == 0 {
            return Err(QuantloopError::invalid(
                "strategy",
                "short_period",
                "short_period must be positive",
            ));
        }
        if short_period >= long_period {
            return Err(QuantloopError::invalid(
                "strategy",
                "long_period",
                format!("short_period ({short_period}) must be less than long_period ({long_period})"),
            ));
        }
        validate_weight(position_weight)?;

        Ok(Self {
            short_period,
            long_period,
            position_weight,
            long_only,
            cursor: SeenCursor::default(),
            averages: HashMap::new(),
        })
    }
}

impl SignalGenerator for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn min_lookback(&self) -> usize {
        self.long_period
    }

    fn generate(
        &mut self,
        window: &MarketWindow<'_>,
        _state: &PortfolioState,
    ) -> Result<SignalMap, QuantloopError> {
        let (short_period, long_period) = (self.short_period, self.long_period);
        let (weight, long_only) = (self.position_weight, self.long_only);
        let averages = &mut self.averages;

        collect_signals(window, &mut self.cursor, long_period, |instrument, fresh| {
            let (short, long) = averages
                .entry(instrument.to_string())
                .or_insert_with(|| (RollingMean::new(short_period), RollingMean::new(long_period)));
            for record in fresh {
                short.update(record.close);
                long.update(record.close);
            }
            Some(crossover_strength(short.value()?, long.value()?, weight, long_only))
        })
    }
}

fn crossover_strength(short_sma: f64, long_sma: f64, weight: f64, long_only: bool) -> f64 {
    let diff = short_sma - long_sma;
    if diff > 0.0 {
        weight
    } else if diff < 0.0 && !long_only {
        -weight
    } else {
        0.0
    }
}
