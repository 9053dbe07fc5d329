//! Pipeline driver: one step per timeline instant.
//!
//! ```text
//! LOADING -> SIGNALING -> RISK_CHECK -> EXECUTING -> ADVANCE -> (next step)
//!                                                        \-> COMPLETE
//!                                      stop requested -----> STOPPED
//!                            any invariant violation -----> ABORTED
//! ```
//!
//! A step runs against a working copy of the ledger and is committed only
//! when every post-step invariant holds, so the state handed back on abort
//! or stop is always the last fully applied step.

use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::QuantloopError;
use super::execution::{ExecutionEngine, Fill, TransactionLog};
use super::market_data::{MarketDataSeries, PriceBook};
use super::portfolio::PortfolioState;
use super::risk::RiskGate;
use super::signal::{SignalGenerator, SignalMap};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Loading,
    Signaling,
    RiskCheck,
    Executing,
    Advance,
    Complete,
    Stopped,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every timeline step was applied.
    Complete,
    /// A stop was requested; the run ended between steps.
    Stopped,
    /// A step broke a ledger invariant and was discarded.
    Aborted { reason: String },
}

/// Requests a clean stop between steps. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub steps: usize,
    pub skipped_signal_steps: usize,
    pub orders: usize,
    pub fills: usize,
    pub rejections: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Ledger after the last committed step.
    pub state: PortfolioState,
    pub log: TransactionLog,
    pub stats: RunStats,
    /// Prices of the last committed step, for marking `state`.
    pub last_prices: Option<PriceBook>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub lookback: usize,
    pub allow_margin: bool,
    pub equity_floor: f64,
}

pub struct Pipeline<'a> {
    series: &'a MarketDataSeries,
    generator: Box<dyn SignalGenerator>,
    risk: Box<dyn RiskGate>,
    engine: Box<dyn ExecutionEngine>,
    config: PipelineConfig,
    stop: StopHandle,
    phase: PipelineState,
}

struct Committed {
    state: PortfolioState,
    fills: Vec<Fill>,
    prices: PriceBook,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        series: &'a MarketDataSeries,
        generator: Box<dyn SignalGenerator>,
        risk: Box<dyn RiskGate>,
        engine: Box<dyn ExecutionEngine>,
        config: PipelineConfig,
    ) -> Result<Self, QuantloopError> {
        if config.lookback == 0 {
            return Err(QuantloopError::invalid(
                "strategy",
                "lookback",
                "lookback must be positive",
            ));
        }
        if generator.min_lookback() > config.lookback {
            return Err(QuantloopError::invalid(
                "strategy",
                "lookback",
                format!(
                    "{} needs a lookback of at least {}, got {}",
                    generator.name(),
                    generator.min_lookback(),
                    config.lookback
                ),
            ));
        }
        if !config.equity_floor.is_finite() {
            return Err(QuantloopError::invalid(
                "portfolio",
                "equity_floor",
                "equity_floor must be finite",
            ));
        }

        Ok(Self {
            series,
            generator,
            risk,
            engine,
            config,
            stop: StopHandle::new(),
            phase: PipelineState::Loading,
        })
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn phase(&self) -> PipelineState {
        self.phase
    }

    /// Drive the whole timeline from `initial`.
    ///
    /// Aborts and stops are outcomes, not errors. `Err` is returned only
    /// when the report sink fails.
    pub fn run(
        &mut self,
        initial: PortfolioState,
        mut sink: Option<&mut dyn ReportPort>,
    ) -> Result<RunReport, QuantloopError> {
        self.phase = PipelineState::Loading;
        let timeline = self.series.timeline();
        info!(
            strategy = self.generator.name(),
            instruments = self.series.instrument_count(),
            steps = timeline.len(),
            initial_capital = initial.initial_capital,
            "run started"
        );

        let mut state = initial;
        let mut log = TransactionLog::new();
        let mut stats = RunStats::default();
        let mut last_prices = None;
        let mut outcome = RunOutcome::Complete;

        for timestamp in timeline {
            if self.stop.is_stopped() {
                info!(%timestamp, "stop requested");
                self.phase = PipelineState::Stopped;
                outcome = RunOutcome::Stopped;
                break;
            }

            match self.step(timestamp, &state, &mut stats) {
                Ok(committed) => {
                    if let (Some(sink), Some(point)) =
                        (sink.as_mut(), committed.state.equity_curve.last())
                    {
                        sink.record_step(&committed.fills, point)?;
                    }
                    log.extend(committed.fills);
                    state = committed.state;
                    last_prices = Some(committed.prices);
                    self.phase = PipelineState::Advance;
                }
                Err(err) => {
                    error!(%timestamp, error = %err, "step aborted");
                    self.phase = PipelineState::Aborted;
                    outcome = RunOutcome::Aborted {
                        reason: err.to_string(),
                    };
                    break;
                }
            }
        }

        if outcome == RunOutcome::Complete {
            self.phase = PipelineState::Complete;
        }
        if let Some(sink) = sink.as_mut() {
            sink.flush()?;
        }

        info!(
            outcome = ?outcome,
            steps = stats.steps,
            fills = stats.fills,
            rejections = stats.rejections,
            "run finished"
        );

        Ok(RunReport {
            outcome,
            state,
            log,
            stats,
            last_prices,
        })
    }

    fn step(
        &mut self,
        timestamp: NaiveDateTime,
        state: &PortfolioState,
        stats: &mut RunStats,
    ) -> Result<Committed, QuantloopError> {
        self.phase = PipelineState::Loading;
        let window = self.series.window(timestamp, self.config.lookback);
        let prices = window.price_book();

        self.phase = PipelineState::Signaling;
        let signals = match self.generator.generate(&window, state) {
            Ok(signals) => signals,
            Err(err @ QuantloopError::InsufficientData { .. }) => {
                debug!(%timestamp, error = %err, "signals skipped");
                stats.skipped_signal_steps += 1;
                SignalMap::new()
            }
            Err(err) if err.is_recoverable() => {
                warn!(%timestamp, error = %err, "signals skipped");
                stats.skipped_signal_steps += 1;
                SignalMap::new()
            }
            Err(err) => return Err(err),
        };

        self.phase = PipelineState::RiskCheck;
        let orders = self.risk.evaluate(&signals, state, &prices);

        self.phase = PipelineState::Executing;
        let mut working = state.clone();
        let fills = self.engine.apply(&orders, &prices, &mut working)?;
        working.check_invariants(&prices, self.config.allow_margin, self.config.equity_floor)?;

        stats.steps += 1;
        stats.orders += orders.len();
        stats.fills += fills.len();
        stats.rejections += self.engine.rejections().len();

        Ok(Committed {
            state: working,
            fills,
            prices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{ExecutionConfig, SimulatedExecution};
    use crate::domain::market_data::MarketWindow;
    use crate::domain::portfolio::EquityPoint;
    use crate::domain::order::OrderReason;
    use crate::domain::risk::{LimitRiskGate, RiskLimits};
    use crate::domain::signal::Signal;
    use crate::domain::strategy::test_support::{series, ts};
    use crate::domain::strategy::{BuyAndHold, SmaCrossover};

    fn gate() -> Box<dyn RiskGate> {
        Box::new(LimitRiskGate::new(
            RiskLimits::new(0.05, 0.5, 0.5, 1.0).unwrap(),
        ))
    }

    fn engine() -> Box<dyn ExecutionEngine> {
        Box::new(SimulatedExecution::new(ExecutionConfig::frictionless()))
    }

    fn config(lookback: usize) -> PipelineConfig {
        PipelineConfig {
            lookback,
            allow_margin: false,
            equity_floor: 0.0,
        }
    }

    /// Emits a fixed strength until `fail_from`, then reports short history.
    struct Scripted {
        strength: f64,
        fail_from: usize,
        calls: usize,
    }

    impl SignalGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn min_lookback(&self) -> usize {
            1
        }

        fn generate(
            &mut self,
            window: &MarketWindow<'_>,
            _state: &PortfolioState,
        ) -> Result<SignalMap, QuantloopError> {
            self.calls += 1;
            if self.calls > self.fail_from {
                return Err(QuantloopError::InsufficientData {
                    instrument: "AAA".into(),
                    have: 0,
                    need: 1,
                });
            }
            let timestamp = window.timestamp();
            Ok(window
                .instruments()
                .map(|id| (id.to_string(), Signal::new(id, timestamp, self.strength)))
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        equity: Vec<EquityPoint>,
        fills: usize,
        flushes: usize,
    }

    impl ReportPort for RecordingSink {
        fn record_step(&mut self, fills: &[Fill], equity: &EquityPoint) -> Result<(), QuantloopError> {
            self.fills += fills.len();
            self.equity.push(equity.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), QuantloopError> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn buy_and_hold_completes() {
        let s = series("AAA", &[10.0, 11.0, 12.0, 13.0]);
        let mut pipeline = Pipeline::new(
            &s,
            Box::new(BuyAndHold::new(0.5).unwrap()),
            gate(),
            engine(),
            config(5),
        )
        .unwrap();

        let report = pipeline.run(PortfolioState::new(10_000.0), None).unwrap();

        assert_eq!(report.outcome, RunOutcome::Complete);
        assert_eq!(pipeline.phase(), PipelineState::Complete);
        assert_eq!(report.stats.steps, 4);
        assert_eq!(report.state.equity_curve.len(), 4);
        assert_eq!(report.state.quantity("AAA"), 500);
        assert_eq!(report.log.len(), 1);
    }

    #[test]
    fn warmup_steps_are_skipped() {
        let s = series("AAA", &[10.0, 11.0, 12.0, 13.0, 14.0]);
        let mut pipeline = Pipeline::new(
            &s,
            Box::new(SmaCrossover::new(2, 3, 0.2, true).unwrap()),
            gate(),
            engine(),
            config(3),
        )
        .unwrap();

        let report = pipeline.run(PortfolioState::new(10_000.0), None).unwrap();
        assert_eq!(report.stats.skipped_signal_steps, 2);
        assert_eq!(report.stats.steps, 5);
        assert_eq!(report.log.fills()[0].timestamp, ts(2));
    }

    #[test]
    fn lookback_shorter_than_strategy_rejected() {
        let s = series("AAA", &[10.0, 11.0]);
        let result = Pipeline::new(
            &s,
            Box::new(SmaCrossover::new(2, 10, 0.2, true).unwrap()),
            gate(),
            engine(),
            config(5),
        );
        assert!(matches!(
            result,
            Err(QuantloopError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn forced_exit_fires_while_signals_skipped() {
        // bought at 100 on step 0, signal source goes quiet, price falls 10%
        let s = series("AAA", &[100.0, 100.0, 90.0, 90.0]);
        let generator = Scripted {
            strength: 0.5,
            fail_from: 1,
            calls: 0,
        };
        let mut pipeline =
            Pipeline::new(&s, Box::new(generator), gate(), engine(), config(2)).unwrap();

        let report = pipeline.run(PortfolioState::new(10_000.0), None).unwrap();
        assert_eq!(report.stats.skipped_signal_steps, 3);
        assert_eq!(report.log.len(), 2);
        assert_eq!(report.log.fills()[1].reason, OrderReason::ForcedExit);
        assert!(report.state.positions.is_empty());
    }

    #[test]
    fn stop_before_first_step() {
        let s = series("AAA", &[10.0, 11.0, 12.0]);
        let stop = StopHandle::new();
        let mut pipeline = Pipeline::new(
            &s,
            Box::new(BuyAndHold::new(0.5).unwrap()),
            gate(),
            engine(),
            config(2),
        )
        .unwrap()
        .with_stop_handle(stop.clone());

        stop.stop();
        let mut sink = RecordingSink::default();
        let report = pipeline
            .run(PortfolioState::new(10_000.0), Some(&mut sink))
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(pipeline.phase(), PipelineState::Stopped);
        assert_eq!(report.stats.steps, 0);
        assert_eq!(sink.flushes, 1);
        assert!(sink.equity.is_empty());
    }

    #[test]
    fn equity_floor_aborts_with_last_consistent_state() {
        let s = series("AAA", &[10.0, 5.0, 4.0]);
        let mut pipeline = Pipeline::new(
            &s,
            Box::new(BuyAndHold::new(1.0).unwrap()),
            Box::new(LimitRiskGate::new(RiskLimits::new(1.0, 1.0, 1.0, 1.0).unwrap())),
            engine(),
            PipelineConfig {
                lookback: 2,
                allow_margin: false,
                equity_floor: 8_000.0,
            },
        )
        .unwrap();

        let mut sink = RecordingSink::default();
        let report = pipeline
            .run(PortfolioState::new(10_000.0), Some(&mut sink))
            .unwrap();

        assert!(report.is_aborted());
        assert_eq!(pipeline.phase(), PipelineState::Aborted);
        // step 0 committed (bought 1000 at 10), step 1 would mark to 5000
        assert_eq!(report.stats.steps, 1);
        assert_eq!(report.state.quantity("AAA"), 1000);
        assert_eq!(report.state.equity_curve.len(), 1);
        assert_eq!(sink.equity.len(), 1);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn sink_receives_every_committed_step() {
        let s = series("AAA", &[10.0, 11.0, 12.0]);
        let mut pipeline = Pipeline::new(
            &s,
            Box::new(BuyAndHold::new(0.5).unwrap()),
            gate(),
            engine(),
            config(2),
        )
        .unwrap();

        let mut sink = RecordingSink::default();
        let report = pipeline
            .run(PortfolioState::new(10_000.0), Some(&mut sink))
            .unwrap();
        assert_eq!(sink.equity, report.state.equity_curve);
        assert_eq!(sink.fills, report.log.len());
    }
}
