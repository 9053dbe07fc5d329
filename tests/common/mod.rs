#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quantloop::domain::error::QuantloopError;
use quantloop::domain::market_data::MarketDataSeries;
pub use quantloop::domain::ohlcv::MarketRecord;
use quantloop::ports::data_port::DataPort;
use std::collections::BTreeMap;

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<MarketRecord>>,
    pub errors: BTreeMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn with_records(mut self, instrument: &str, records: Vec<MarketRecord>) -> Self {
        self.data.insert(instrument.to_string(), records);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_records(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MarketRecord>, QuantloopError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(QuantloopError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(instrument)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.timestamp >= start && r.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_instruments(&self) -> Result<Vec<String>, QuantloopError> {
        Ok(self.data.keys().cloned().collect())
    }

    fn data_range(
        &self,
        instrument: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, QuantloopError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(QuantloopError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(instrument) {
            Some(records) if !records.is_empty() => Ok(Some((
                records[0].timestamp,
                records[records.len() - 1].timestamp,
                records.len(),
            ))),
            _ => Ok(None),
        }
    }
}

/// Midnight on 2024-01-01 plus `i` days.
pub fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(i as i64)
}

pub fn make_record(instrument: &str, i: usize, close: f64) -> MarketRecord {
    MarketRecord {
        instrument_id: instrument.to_string(),
        timestamp: day(i),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 10_000,
    }
}

/// One record per day starting at [`day`]`(0)`.
pub fn make_records(instrument: &str, closes: &[f64]) -> Vec<MarketRecord> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_record(instrument, i, close))
        .collect()
}

pub fn make_series(instruments: &[(&str, &[f64])]) -> MarketDataSeries {
    let records = instruments
        .iter()
        .flat_map(|(instrument, closes)| make_records(instrument, closes))
        .collect();
    MarketDataSeries::from_records(records).unwrap()
}

pub fn generate_closes(count: usize, start_price: f64, step: f64) -> Vec<f64> {
    (0..count).map(|i| start_price + step * i as f64).collect()
}
