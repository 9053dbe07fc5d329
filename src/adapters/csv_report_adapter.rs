//! CSV transaction log and equity curve writer.
//!
//! Writes `fills.csv` and `equity.csv` under the output directory, one row
//! per fill and one per committed step.

use crate::domain::error::QuantloopError;
use crate::domain::execution::Fill;
use crate::domain::portfolio::EquityPoint;
use crate::ports::report_port::ReportPort;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const FILLS_FILE: &str = "fills.csv";
pub const EQUITY_FILE: &str = "equity.csv";

pub struct CsvReportAdapter {
    output_dir: PathBuf,
    fills: csv::Writer<File>,
    equity: csv::Writer<File>,
    // an empty run must still produce a fills header
    fills_written: bool,
}

impl CsvReportAdapter {
    pub fn create(output_dir: &Path) -> Result<Self, QuantloopError> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            fills: csv::Writer::from_path(output_dir.join(FILLS_FILE))?,
            equity: csv::Writer::from_path(output_dir.join(EQUITY_FILE))?,
            fills_written: false,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

const FILL_HEADER: [&str; 10] = [
    "order_id",
    "instrument_id",
    "timestamp",
    "reason",
    "executed_quantity",
    "executed_price",
    "slippage_applied",
    "fee",
    "realized_pnl",
    "closing",
];

impl ReportPort for CsvReportAdapter {
    fn record_step(&mut self, fills: &[Fill], equity: &EquityPoint) -> Result<(), QuantloopError> {
        for fill in fills {
            self.fills.serialize(fill)?;
            self.fills_written = true;
        }
        self.equity.serialize(equity)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), QuantloopError> {
        if !self.fills_written {
            self.fills.write_record(FILL_HEADER)?;
            self.fills_written = true;
        }
        self.fills.flush()?;
        self.equity.flush()?;
        Ok(())
    }
}
