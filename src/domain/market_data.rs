//! Time-indexed market data, trailing windows, and price lookups.
//!
//! A [`MarketDataSeries`] holds, per instrument, records with strictly
//! increasing timestamps. It is immutable once built: the pipeline only
//! takes read-only [`MarketWindow`] slices and [`PriceBook`] snapshots.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

use super::error::QuantloopError;
use super::ohlcv::MarketRecord;

#[derive(Debug, Clone, Default)]
pub struct MarketDataSeries {
    records: BTreeMap<String, Vec<MarketRecord>>,
}

impl MarketDataSeries {
    /// Build a series, grouping records by instrument in input order.
    ///
    /// Fails if any instrument's timestamps are not strictly increasing or a
    /// record is malformed.
    pub fn from_records(records: Vec<MarketRecord>) -> Result<Self, QuantloopError> {
        let mut grouped: BTreeMap<String, Vec<MarketRecord>> = BTreeMap::new();
        for record in records {
            grouped
                .entry(record.instrument_id.clone())
                .or_default()
                .push(record);
        }

        for (instrument, recs) in &grouped {
            if let Some(bad) = recs.iter().find(|r| !r.is_well_formed()) {
                return Err(QuantloopError::Data {
                    reason: format!("malformed record for {} at {}", instrument, bad.timestamp),
                });
            }
            if let Some(pair) = recs.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
                return Err(QuantloopError::Data {
                    reason: format!(
                        "timestamps for {} not strictly increasing: {} then {}",
                        instrument, pair[0].timestamp, pair[1].timestamp
                    ),
                });
            }
        }

        Ok(Self { records: grouped })
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn instrument_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.values().all(Vec::is_empty)
    }

    pub fn records(&self, instrument: &str) -> &[MarketRecord] {
        self.records
            .get(instrument)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sorted union of every instrument's timestamps.
    pub fn timeline(&self) -> Vec<NaiveDateTime> {
        let unique: BTreeSet<NaiveDateTime> = self
            .records
            .values()
            .flat_map(|recs| recs.iter().map(|r| r.timestamp))
            .collect();
        unique.into_iter().collect()
    }

    /// First and last timestamp plus record count for one instrument.
    pub fn data_range(&self, instrument: &str) -> Option<(NaiveDateTime, NaiveDateTime, usize)> {
        let recs = self.records(instrument);
        match (recs.first(), recs.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, recs.len())),
            _ => None,
        }
    }

    /// Trailing slice of at most `lookback` records per instrument, ending at
    /// or before `timestamp`. Instruments with no record yet are absent.
    pub fn window(&self, timestamp: NaiveDateTime, lookback: usize) -> MarketWindow<'_> {
        let slices = self
            .records
            .iter()
            .filter_map(|(instrument, recs)| {
                let end = recs.partition_point(|r| r.timestamp <= timestamp);
                let start = end.saturating_sub(lookback);
                (end > start).then(|| (instrument.as_str(), &recs[start..end]))
            })
            .collect();
        MarketWindow { timestamp, slices }
    }
}

/// Read-only trailing view of the series at one step.
#[derive(Debug, Clone)]
pub struct MarketWindow<'a> {
    timestamp: NaiveDateTime,
    slices: BTreeMap<&'a str, &'a [MarketRecord]>,
}

impl<'a> MarketWindow<'a> {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn instruments(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.slices.keys().copied()
    }

    pub fn records(&self, instrument: &str) -> &'a [MarketRecord] {
        self.slices.get(instrument).copied().unwrap_or(&[])
    }

    pub fn latest(&self, instrument: &str) -> Option<&'a MarketRecord> {
        self.records(instrument).last()
    }

    /// Latest known quote per instrument. Quotes may be stale when an
    /// instrument has no bar at the window timestamp.
    pub fn price_book(&self) -> PriceBook {
        let mut book = PriceBook::new(self.timestamp);
        for (instrument, recs) in &self.slices {
            if let Some(last) = recs.last() {
                book.insert(
                    instrument,
                    Quote {
                        timestamp: last.timestamp,
                        close: last.close,
                        volume: last.volume,
                    },
                );
            }
        }
        book
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub volume: u64,
}

/// Price lookup at the current step.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBook {
    timestamp: NaiveDateTime,
    quotes: BTreeMap<String, Quote>,
}

impl PriceBook {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            quotes: BTreeMap::new(),
        }
    }

    /// Builder for a quote observed at the book's own timestamp.
    pub fn with_quote(mut self, instrument: &str, close: f64, volume: u64) -> Self {
        let timestamp = self.timestamp;
        self.insert(
            instrument,
            Quote {
                timestamp,
                close,
                volume,
            },
        );
        self
    }

    pub fn insert(&mut self, instrument: &str, quote: Quote) {
        self.quotes.insert(instrument.to_string(), quote);
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn get(&self, instrument: &str) -> Option<&Quote> {
        self.quotes.get(instrument)
    }

    /// Last known close, possibly stale.
    pub fn close(&self, instrument: &str) -> Option<f64> {
        self.quotes.get(instrument).map(|q| q.close)
    }

    /// Quote only if it was observed exactly at `timestamp`.
    pub fn quote_at(&self, instrument: &str, timestamp: NaiveDateTime) -> Option<&Quote> {
        self.quotes
            .get(instrument)
            .filter(|q| q.timestamp == timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Quote)> {
        self.quotes.iter().map(|(k, v)| (k.as_str(), v))
    }
}
