//! Trading signals and the signal-generator interface.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::error::QuantloopError;
use super::market_data::MarketWindow;
use super::portfolio::PortfolioState;

/// Target exposure for one instrument at one step. The sign is the direction,
/// the magnitude is the fraction of equity the strategy wants committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub instrument_id: String,
    pub timestamp: NaiveDateTime,
    pub strength: f64,
}

impl Signal {
    /// Clamps `strength` into [-1, 1]; a non-finite strength becomes 0.
    pub fn new(instrument_id: &str, timestamp: NaiveDateTime, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Signal {
            instrument_id: instrument_id.to_string(),
            timestamp,
            strength,
        }
    }

    pub fn is_long(&self) -> bool {
        self.strength > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.strength < 0.0
    }
}

pub type SignalMap = BTreeMap<String, Signal>;

/// Maps a trailing data window to per-instrument signals.
///
/// Implementations own their indicator state and update it incrementally
/// from records newer than the last call. Instruments whose window is
/// shorter than [`min_lookback`](SignalGenerator::min_lookback) are left
/// out; when none qualifies, `generate` fails with
/// [`QuantloopError::InsufficientData`].
pub trait SignalGenerator {
    fn name(&self) -> &str;

    fn min_lookback(&self) -> usize;

    fn generate(
        &mut self,
        window: &MarketWindow<'_>,
        state: &PortfolioState,
    ) -> Result<SignalMap, QuantloopError>;
}
