//! Buy and hold: one entry per instrument, used as a benchmark.
//!
//! Signals `position_weight` until a position is seen in the ledger, then
//! stays silent so the holding is never rebalanced. A rejected entry is
//! retried on the next step.

use std::collections::BTreeSet;

use crate::domain::error::QuantloopError;
use crate::domain::market_data::MarketWindow;
use crate::domain::portfolio::PortfolioState;
use crate::domain::signal::{Signal, SignalGenerator, SignalMap};

use super::validate_weight;

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    position_weight: f64,
    entered: BTreeSet<String>,
}

impl BuyAndHold {
    pub fn new(position_weight: f64) -> Result<Self, QuantloopError> {
        validate_weight(position_weight)?;
        Ok(Self {
            position_weight,
            entered: BTreeSet::new(),
        })
    }
}

impl SignalGenerator for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn min_lookback(&self) -> usize {
        1
    }

    fn generate(
        &mut self,
        window: &MarketWindow<'_>,
        state: &PortfolioState,
    ) -> Result<SignalMap, QuantloopError> {
        let timestamp = window.timestamp();
        let mut signals = SignalMap::new();
        let mut quoted = false;

        for instrument in window.instruments() {
            if window.records(instrument).is_empty() {
                continue;
            }
            quoted = true;
            if state.quantity(instrument) != 0 {
                self.entered.insert(instrument.to_string());
            }
            if self.entered.contains(instrument) {
                continue;
            }
            signals.insert(
                instrument.to_string(),
                Signal::new(instrument, timestamp, self.position_weight),
            );
        }

        if !quoted {
            return Err(QuantloopError::InsufficientData {
                instrument: "*".to_string(),
                have: 0,
                need: 1,
            });
        }
        Ok(signals)
    }
}
