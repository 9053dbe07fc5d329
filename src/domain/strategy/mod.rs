//! Reference strategies and their configuration.
//!
//! Each strategy implements [`SignalGenerator`] and keeps per-instrument
//! state. The indicator strategies read their windows through a
//! [`SeenCursor`], which hands them only the records not consumed yet, so a
//! call costs O(new records) rather than O(window).

pub mod buy_and_hold;
pub mod momentum;
pub mod sma_crossover;

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

use super::error::QuantloopError;
use super::market_data::MarketWindow;
use super::ohlcv::MarketRecord;
use super::signal::{Signal, SignalGenerator, SignalMap};

pub use buy_and_hold::BuyAndHold;
pub use momentum::Momentum;
pub use sma_crossover::SmaCrossover;

/// Strategy selection and parameters, validated by each constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    SmaCrossover {
        short_period: usize,
        long_period: usize,
        position_weight: f64,
        long_only: bool,
    },
    Momentum {
        period: usize,
        full_scale: f64,
        position_weight: f64,
        long_only: bool,
    },
    BuyAndHold {
        position_weight: f64,
    },
}

impl StrategyConfig {
    pub fn build(&self) -> Result<Box<dyn SignalGenerator>, QuantloopError> {
        Ok(match *self {
            StrategyConfig::SmaCrossover {
                short_period,
                long_period,
                position_weight,
                long_only,
            } => Box::new(SmaCrossover::new(
                short_period,
                long_period,
                position_weight,
                long_only,
            )?),
            StrategyConfig::Momentum {
                period,
                full_scale,
                position_weight,
                long_only,
            } => Box::new(Momentum::new(period, full_scale, position_weight, long_only)?),
            StrategyConfig::BuyAndHold { position_weight } => {
                Box::new(BuyAndHold::new(position_weight)?)
            }
        })
    }

    pub fn min_lookback(&self) -> usize {
        match *self {
            StrategyConfig::SmaCrossover { long_period, .. } => long_period,
            StrategyConfig::Momentum { period, .. } => period + 1,
            StrategyConfig::BuyAndHold { .. } => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StrategyConfig::SmaCrossover { .. } => "sma_crossover",
            StrategyConfig::Momentum { .. } => "momentum",
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
        }
    }
}

pub(crate) fn validate_weight(position_weight: f64) -> Result<(), QuantloopError> {
    if !(position_weight > 0.0 && position_weight <= 1.0) {
        return Err(QuantloopError::invalid(
            "strategy",
            "position_weight",
            "position_weight must be in (0, 1]",
        ));
    }
    Ok(())
}

/// Remembers the newest timestamp consumed per instrument.
#[derive(Debug, Clone, Default)]
pub(crate) struct SeenCursor {
    last_seen: HashMap<String, NaiveDateTime>,
}

impl SeenCursor {
    /// Records in `records` newer than anything consumed before.
    pub(crate) fn unseen<'a>(
        &mut self,
        instrument: &str,
        records: &'a [MarketRecord],
    ) -> &'a [MarketRecord] {
        let start = match self.last_seen.get(instrument) {
            Some(last) => records.partition_point(|r| r.timestamp <= *last),
            None => 0,
        };
        if let Some(newest) = records.last() {
            self.last_seen
                .insert(instrument.to_string(), newest.timestamp);
        }
        &records[start..]
    }
}

/// Shared driver for per-instrument strategies.
///
/// `update` is called for every instrument in the window with its unseen
/// records and must return the strength once its indicators are warm.
/// Instruments with fewer than `min_lookback` records in the window are
/// skipped after their state is updated.
pub(crate) fn collect_signals<F>(
    window: &MarketWindow<'_>,
    cursor: &mut SeenCursor,
    min_lookback: usize,
    mut update: F,
) -> Result<SignalMap, QuantloopError>
where
    F: FnMut(&str, &[MarketRecord]) -> Option<f64>,
{
    let timestamp = window.timestamp();
    let mut signals = SignalMap::new();
    let mut shortfall: Option<(String, usize)> = None;

    for instrument in window.instruments() {
        let records = window.records(instrument);
        let strength = update(instrument, cursor.unseen(instrument, records));

        if records.len() < min_lookback {
            debug!(
                instrument,
                %timestamp,
                have = records.len(),
                need = min_lookback,
                "insufficient history"
            );
            if shortfall.is_none() {
                shortfall = Some((instrument.to_string(), records.len()));
            }
            continue;
        }

        if let Some(strength) = strength {
            signals.insert(
                instrument.to_string(),
                Signal::new(instrument, timestamp, strength),
            );
        }
    }

    if signals.is_empty() {
        let (instrument, have) = shortfall.unwrap_or_else(|| ("*".to_string(), 0));
        return Err(QuantloopError::InsufficientData {
            instrument,
            have,
            need: min_lookback,
        });
    }

    Ok(signals)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use crate::domain::market_data::MarketDataSeries;
    use crate::domain::ohlcv::MarketRecord;

    pub fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i as i64)
    }

    pub fn series(instrument: &str, closes: &[f64]) -> MarketDataSeries {
        MarketDataSeries::from_records(
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| MarketRecord {
                    instrument_id: instrument.to_string(),
                    timestamp: ts(i),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000,
                })
                .collect(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{series, ts};
    use super::*;

    #[test]
    fn cursor_yields_only_new_records() {
        let s = series("AAA", &[1.0, 2.0, 3.0, 4.0]);
        let mut cursor = SeenCursor::default();

        let first = cursor.unseen("AAA", s.window(ts(1), 3).records("AAA"));
        assert_eq!(first.len(), 2);

        let second = cursor.unseen("AAA", s.window(ts(2), 3).records("AAA"));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].close, 3.0);

        let repeat = cursor.unseen("AAA", s.window(ts(2), 3).records("AAA"));
        assert!(repeat.is_empty());
    }

    #[test]
    fn min_lookback_per_kind() {
        let sma = StrategyConfig::SmaCrossover {
            short_period: 5,
            long_period: 20,
            position_weight: 0.1,
            long_only: true,
        };
        let mom = StrategyConfig::Momentum {
            period: 10,
            full_scale: 0.1,
            position_weight: 0.1,
            long_only: false,
        };
        assert_eq!(sma.min_lookback(), 20);
        assert_eq!(mom.min_lookback(), 11);
        assert_eq!(StrategyConfig::BuyAndHold { position_weight: 1.0 }.min_lookback(), 1);
    }

    #[test]
    fn build_rejects_bad_parameters() {
        let bad = StrategyConfig::SmaCrossover {
            short_period: 20,
            long_period: 5,
            position_weight: 0.1,
            long_only: true,
        };
        assert!(matches!(
            bad.build(),
            Err(QuantloopError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn build_names_generator() {
        let generator = StrategyConfig::BuyAndHold { position_weight: 0.5 }
            .build()
            .unwrap();
        assert_eq!(generator.name(), "buy_and_hold");
    }
}
