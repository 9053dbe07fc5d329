//! CSV market data adapter.
//!
//! One `<INSTRUMENT>.csv` per instrument under the base directory, with the
//! header `timestamp,open,high,low,close,volume`. Timestamps are
//! `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.

use crate::domain::config::parse_timestamp;
use crate::domain::error::QuantloopError;
use crate::domain::ohlcv::MarketRecord;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}.csv"))
    }

    fn read_all(&self, instrument: &str) -> Result<Vec<MarketRecord>, QuantloopError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| QuantloopError::Data {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut records = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let row = result?;
            let field = |idx: usize, name: &str| {
                row.get(idx).map(str::trim).ok_or_else(|| QuantloopError::Data {
                    reason: format!("{instrument} row {}: missing {name} column", line + 1),
                })
            };
            let number = |idx: usize, name: &str| -> Result<f64, QuantloopError> {
                let raw = field(idx, name)?;
                raw.parse().map_err(|e| QuantloopError::Data {
                    reason: format!("{instrument} row {}: invalid {name} '{raw}': {e}", line + 1),
                })
            };

            let timestamp = parse_timestamp(field(0, "timestamp")?, "timestamp").map_err(|_| {
                QuantloopError::Data {
                    reason: format!("{instrument} row {}: invalid timestamp", line + 1),
                }
            })?;
            let raw_volume = field(5, "volume")?;
            let volume: u64 = raw_volume.parse().map_err(|e| QuantloopError::Data {
                reason: format!("{instrument} row {}: invalid volume '{raw_volume}': {e}", line + 1),
            })?;

            records.push(MarketRecord {
                instrument_id: instrument.to_string(),
                timestamp,
                open: number(1, "open")?,
                high: number(2, "high")?,
                low: number(3, "low")?,
                close: number(4, "close")?,
                volume,
            });
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_records(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MarketRecord>, QuantloopError> {
        let mut records = self.read_all(instrument)?;
        records.retain(|r| r.timestamp >= start && r.timestamp <= end);
        Ok(records)
    }

    fn list_instruments(&self) -> Result<Vec<String>, QuantloopError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| QuantloopError::Data {
            reason: format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    instruments.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        instruments.sort();
        Ok(instruments)
    }

    fn data_range(
        &self,
        instrument: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, QuantloopError> {
        let records = self.read_all(instrument)?;
        Ok(match (records.first(), records.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, records.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n";

        fs::write(path.join("AAA.csv"), csv_content).unwrap();
        fs::write(path.join("BBB.csv"), "timestamp,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("notes.txt"), "not data").unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_records_sorted_and_parsed() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let records = adapter.fetch_records("AAA", at(15), at(17)).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].timestamp, at(15));
        assert_eq!(records[0].instrument_id, "AAA");
        assert_eq!(records[0].open, 100.0);
        assert_eq!(records[0].high, 110.0);
        assert_eq!(records[0].low, 90.0);
        assert_eq!(records[0].close, 105.0);
        assert_eq!(records[0].volume, 50000);
        assert_eq!(records[2].timestamp, at(17));
    }

    #[test]
    fn fetch_records_filters_by_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let records = adapter.fetch_records("AAA", at(16), at(16)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, 110.0);
    }

    #[test]
    fn intraday_timestamps_accepted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("AAA.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15 09:30:00,1,2,0.5,1.5,10\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());

        let records = adapter.fetch_records("AAA", at(15), at(16)).unwrap();
        assert_eq!(records[0].timestamp.format("%H:%M").to_string(), "09:30");
    }

    #[test]
    fn missing_file_is_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(matches!(
            adapter.fetch_records("XYZ", at(1), at(31)),
            Err(QuantloopError::Data { .. })
        ));
    }

    #[test]
    fn malformed_row_is_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("AAA.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,2,0.5,abc,10\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());

        match adapter.fetch_records("AAA", at(1), at(31)) {
            Err(QuantloopError::Data { reason }) => assert!(reason.contains("close")),
            other => panic!("expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn list_instruments_from_csv_files() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_instruments().unwrap(), vec!["AAA", "BBB"]);
    }

    #[test]
    fn data_range_spans_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(adapter.data_range("AAA").unwrap(), Some((at(15), at(17), 3)));
        assert_eq!(adapter.data_range("BBB").unwrap(), None);
    }
}
