//! Run configuration, validated up front from a [`ConfigPort`].
//!
//! Every value is checked before any data is loaded; the first problem is
//! reported as `ConfigMissing` or `InvalidConfiguration`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::PathBuf;

use crate::domain::error::QuantloopError;
use crate::domain::execution::{ExecutionConfig, FeeModel, SlippageModel};
use crate::domain::pipeline::PipelineConfig;
use crate::domain::risk::RiskLimits;
use crate::domain::strategy::StrategyConfig;
use crate::domain::universe::parse_instruments;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub path: PathBuf,
    pub instruments: Vec<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub initial_capital: f64,
    pub allow_margin: bool,
    pub allow_shorting: bool,
    pub equity_floor: f64,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data: DataConfig,
    pub portfolio: PortfolioConfig,
    pub risk: RiskLimits,
    pub execution: ExecutionConfig,
    pub strategy: StrategyConfig,
    pub lookback: usize,
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn from_port(port: &dyn ConfigPort) -> Result<Self, QuantloopError> {
        let data = data_config(port)?;
        let portfolio = portfolio_config(port)?;
        let risk = risk_limits(port, portfolio.allow_shorting)?;
        let execution = execution_config(port, portfolio.allow_margin)?;
        let strategy = strategy_config(port)?;

        let lookback = optional_usize(port, "strategy", "lookback", strategy.min_lookback())?;
        if lookback == 0 {
            return Err(QuantloopError::invalid(
                "strategy",
                "lookback",
                "lookback must be positive",
            ));
        }
        if lookback < strategy.min_lookback() {
            return Err(QuantloopError::invalid(
                "strategy",
                "lookback",
                format!(
                    "{} needs a lookback of at least {}, got {lookback}",
                    strategy.kind(),
                    strategy.min_lookback()
                ),
            ));
        }
        // parameter checks live in the strategy constructors
        strategy.build()?;

        let output_dir = port
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(RunConfig {
            data,
            portfolio,
            risk,
            execution,
            strategy,
            lookback,
            output_dir: PathBuf::from(output_dir),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            lookback: self.lookback,
            allow_margin: self.portfolio.allow_margin,
            equity_floor: self.portfolio.equity_floor,
        }
    }
}

fn data_config(port: &dyn ConfigPort) -> Result<DataConfig, QuantloopError> {
    let path = required_string(port, "data", "path")?;
    let instruments = parse_instruments(&required_string(port, "data", "instruments")?)
        .map_err(|e| QuantloopError::invalid("data", "instruments", e.to_string()))?;
    let start = parse_timestamp(&required_string(port, "data", "start")?, "start")?;
    let end = parse_timestamp(&required_string(port, "data", "end")?, "end")?;

    if start >= end {
        return Err(QuantloopError::invalid(
            "data",
            "start",
            "start must be before end",
        ));
    }

    Ok(DataConfig {
        path: PathBuf::from(path),
        instruments,
        start,
        end,
    })
}

fn portfolio_config(port: &dyn ConfigPort) -> Result<PortfolioConfig, QuantloopError> {
    let initial_capital =
        optional_f64(port, "portfolio", "initial_capital", DEFAULT_INITIAL_CAPITAL)?;
    if initial_capital <= 0.0 {
        return Err(QuantloopError::invalid(
            "portfolio",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let equity_floor = optional_f64(port, "portfolio", "equity_floor", 0.0)?;
    if equity_floor >= initial_capital {
        return Err(QuantloopError::invalid(
            "portfolio",
            "equity_floor",
            "equity_floor must be below initial_capital",
        ));
    }

    let risk_free_rate = optional_f64(port, "portfolio", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(QuantloopError::invalid(
            "portfolio",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }

    Ok(PortfolioConfig {
        initial_capital,
        allow_margin: optional_bool(port, "portfolio", "allow_margin", false)?,
        allow_shorting: optional_bool(port, "portfolio", "allow_shorting", false)?,
        equity_floor,
        risk_free_rate,
    })
}

fn risk_limits(port: &dyn ConfigPort, allow_shorting: bool) -> Result<RiskLimits, QuantloopError> {
    let limits = RiskLimits::new(
        optional_f64(port, "risk", "max_position_loss_pct", 0.05)?,
        optional_f64(port, "risk", "max_position_gain_pct", 0.15)?,
        optional_f64(port, "risk", "max_position_pct", 0.10)?,
        optional_f64(port, "risk", "max_gross_exposure_pct", 1.0)?,
    )?
    .with_shorting(allow_shorting);

    if port.has_key("risk", "max_daily_loss_pct") {
        limits.with_max_daily_loss(optional_f64(port, "risk", "max_daily_loss_pct", 0.0)?)
    } else {
        Ok(limits)
    }
}

fn execution_config(
    port: &dyn ConfigPort,
    allow_margin: bool,
) -> Result<ExecutionConfig, QuantloopError> {
    let bps = optional_f64(port, "execution", "slippage_bps", 0.0)?;
    let slippage = match optional_choice(port, "execution", "slippage_model", "fixed").as_str() {
        "fixed" => SlippageModel::FixedBps(bps),
        "volume" => SlippageModel::VolumeProportional { bps },
        other => {
            return Err(QuantloopError::invalid(
                "execution",
                "slippage_model",
                format!("unknown slippage_model '{other}', expected fixed or volume"),
            ))
        }
    };

    let fee_value = optional_f64(port, "execution", "fee_value", 0.0)?;
    let fee = match optional_choice(port, "execution", "fee_model", "flat").as_str() {
        "flat" => FeeModel::Flat {
            per_fill: fee_value,
        },
        "proportional" => FeeModel::Proportional { rate: fee_value },
        other => {
            return Err(QuantloopError::invalid(
                "execution",
                "fee_model",
                format!("unknown fee_model '{other}', expected flat or proportional"),
            ))
        }
    };

    ExecutionConfig::new(slippage, fee, allow_margin)
}

fn strategy_config(port: &dyn ConfigPort) -> Result<StrategyConfig, QuantloopError> {
    let kind = required_string(port, "strategy", "kind")?.trim().to_lowercase();
    let position_weight = optional_f64(port, "strategy", "position_weight", 0.1)?;
    let long_only = optional_bool(port, "strategy", "long_only", true)?;

    match kind.as_str() {
        "sma_crossover" => Ok(StrategyConfig::SmaCrossover {
            short_period: required_usize(port, "strategy", "short_period")?,
            long_period: required_usize(port, "strategy", "long_period")?,
            position_weight,
            long_only,
        }),
        "momentum" => Ok(StrategyConfig::Momentum {
            period: required_usize(port, "strategy", "period")?,
            full_scale: optional_f64(port, "strategy", "full_scale", 0.1)?,
            position_weight,
            long_only,
        }),
        "buy_and_hold" => Ok(StrategyConfig::BuyAndHold { position_weight }),
        other => Err(QuantloopError::invalid(
            "strategy",
            "kind",
            format!("unknown strategy kind '{other}'"),
        )),
    }
}

/// `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD` at midnight.
pub fn parse_timestamp(value: &str, key: &str) -> Result<NaiveDateTime, QuantloopError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
        .map_err(|_| {
            QuantloopError::invalid(
                "data",
                key,
                format!("invalid {key} '{value}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"),
            )
        })
}

fn required_string(port: &dyn ConfigPort, section: &str, key: &str) -> Result<String, QuantloopError> {
    match port.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(QuantloopError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn optional_choice(port: &dyn ConfigPort, section: &str, key: &str, default: &str) -> String {
    port.get_string(section, key)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_f64(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, QuantloopError> {
    if !port.has_key(section, key) {
        return Ok(default);
    }
    let raw = required_string(port, section, key)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| QuantloopError::invalid(section, key, format!("'{raw}' is not a number")))
}

fn optional_bool(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, QuantloopError> {
    if !port.has_key(section, key) {
        return Ok(default);
    }
    let raw = required_string(port, section, key)?;
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(QuantloopError::invalid(
            section,
            key,
            format!("'{raw}' is not a boolean, expected true/false, yes/no or 1/0"),
        )),
    }
}

fn optional_usize(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, QuantloopError> {
    if !port.has_key(section, key) {
        return Ok(default);
    }
    let raw = required_string(port, section, key)?;
    raw.parse::<usize>().map_err(|_| {
        QuantloopError::invalid(section, key, format!("'{raw}' is not a non-negative integer"))
    })
}

fn required_usize(port: &dyn ConfigPort, section: &str, key: &str) -> Result<usize, QuantloopError> {
    required_string(port, section, key)?;
    optional_usize(port, section, key, 0)
}
