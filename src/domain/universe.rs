//! Instrument universe: list parsing and history-checked loading.
//!
//! Instruments that fail to load, or return fewer records than the
//! strategy's lookback, are skipped with a warning. Loading fails only when
//! nothing usable remains.

use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::domain::error::QuantloopError;
use crate::domain::market_data::MarketDataSeries;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in instrument list")]
    EmptyToken,

    #[error("duplicate instrument: {0}")]
    DuplicateInstrument(String),
}

/// Split a comma-separated instrument list, trimming whitespace.
pub fn parse_instruments(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut instruments = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(trimmed) {
            return Err(UniverseError::DuplicateInstrument(trimmed.to_string()));
        }
        instruments.push(trimmed.to_string());
    }

    Ok(instruments)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    NoData,
    InsufficientHistory { records: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedInstrument {
    pub instrument: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub series: MarketDataSeries,
    pub skipped: Vec<SkippedInstrument>,
}

impl MarketDataSeries {
    /// Fetch `instruments` over `[start, end]` and build a series from the
    /// ones with at least `min_records` records.
    pub fn load(
        port: &dyn DataPort,
        instruments: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        min_records: usize,
    ) -> Result<LoadedUniverse, QuantloopError> {
        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for instrument in instruments {
            let reason = match port.fetch_records(instrument, start, end) {
                Err(err) => SkipReason::FetchFailed(err.to_string()),
                Ok(fetched) if fetched.is_empty() => SkipReason::NoData,
                Ok(fetched) if fetched.len() < min_records => SkipReason::InsufficientHistory {
                    records: fetched.len(),
                },
                Ok(fetched) => {
                    info!(instrument = %instrument, records = fetched.len(), "loaded");
                    records.extend(fetched);
                    continue;
                }
            };
            warn!(instrument = %instrument, reason = ?reason, "instrument skipped");
            skipped.push(SkippedInstrument {
                instrument: instrument.clone(),
                reason,
            });
        }

        if records.is_empty() {
            return Err(QuantloopError::NoData {
                instrument: instruments.join(","),
            });
        }
        if !skipped.is_empty() {
            warn!(
                loaded = instruments.len() - skipped.len(),
                requested = instruments.len(),
                "partial universe"
            );
        }

        Ok(LoadedUniverse {
            series: MarketDataSeries::from_records(records)?,
            skipped,
        })
    }
}
