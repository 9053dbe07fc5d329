//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{CsvReportAdapter, EQUITY_FILE, FILLS_FILE};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config::RunConfig;
use crate::domain::error::QuantloopError;
use crate::domain::execution::SimulatedExecution;
use crate::domain::market_data::MarketDataSeries;
use crate::domain::metrics::Metrics;
use crate::domain::pipeline::{Pipeline, RunOutcome, RunReport};
use crate::domain::portfolio::PortfolioState;
use crate::domain::risk::LimitRiskGate;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "quantloop", about = "Strategy, risk gate and execution pipeline")]
pub struct Cli {
    /// Log filter, e.g. `debug` or `quantloop=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline over the configured data
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a run configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data ranges for the configured instruments
    Info {
        #[arg(short, long)]
        config: PathBuf,
        /// List every instrument in the data directory
        #[arg(long)]
        all: bool,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.log_level.as_deref());
    match cli.command {
        Command::Run { config, output } => run_command(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, all } => run_info(&config, all),
    }
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<RunConfig, ExitCode> {
    let adapter = FileConfigAdapter::from_file(path).map_err(|e| report_error(&e))?;
    RunConfig::from_port(&adapter).map_err(|e| report_error(&e))
}

fn report_error(err: &QuantloopError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn run_command(config_path: &Path, output_override: Option<&Path>) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let run_config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    // Stages 2-6: Data port dependent pipeline
    let data_port = CsvAdapter::new(run_config.data.path.clone());
    let output_dir = output_override.unwrap_or(run_config.output_dir.as_path());
    run_pipeline(&run_config, &data_port, output_dir)
}

pub fn run_pipeline(run_config: &RunConfig, data_port: &dyn DataPort, output_dir: &Path) -> ExitCode {
    // Stage 2: Load the universe
    eprintln!(
        "Loading {} instruments, {} to {}",
        run_config.data.instruments.len(),
        run_config.data.start,
        run_config.data.end
    );
    let universe = match MarketDataSeries::load(
        data_port,
        &run_config.data.instruments,
        run_config.data.start,
        run_config.data.end,
        run_config.lookback,
    ) {
        Ok(u) => u,
        Err(e) => return report_error(&e),
    };
    for skipped in &universe.skipped {
        eprintln!("warning: skipping {} ({:?})", skipped.instrument, skipped.reason);
    }

    // Stage 3: Assemble the pipeline
    let generator = match run_config.strategy.build() {
        Ok(g) => g,
        Err(e) => return report_error(&e),
    };
    let mut pipeline = match Pipeline::new(
        &universe.series,
        generator,
        Box::new(LimitRiskGate::new(run_config.risk.clone())),
        Box::new(SimulatedExecution::new(run_config.execution.clone())),
        run_config.pipeline_config(),
    ) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };

    let mut report = match CsvReportAdapter::create(output_dir) {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };

    // Stage 4: Run
    eprintln!(
        "Running {}: {} instruments, {} steps",
        run_config.strategy.kind(),
        universe.series.instrument_count(),
        universe.series.timeline().len()
    );
    let initial = PortfolioState::new(run_config.portfolio.initial_capital);
    let result = match pipeline.run(initial, Some(&mut report)) {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };

    // Stage 5: Compute metrics
    let metrics = Metrics::compute(&result.state, &result.log, run_config.portfolio.risk_free_rate);

    // Stage 6: Print console summary to stderr
    eprintln!("\n=== Run Summary ===");
    eprintln!("Steps:            {}", result.stats.steps);
    eprintln!("Skipped Signals:  {}", result.stats.skipped_signal_steps);
    eprintln!("Orders:           {}", result.stats.orders);
    eprintln!("Fills:            {}", result.stats.fills);
    eprintln!("Rejections:       {}", result.stats.rejections);
    eprintln!("Final Cash:       {:.2}", result.state.cash);
    if let Some(equity) = result.state.last_equity() {
        eprintln!("Final Equity:     {equity:.2}");
    }
    eprintln!("Open Positions:   {}", result.state.position_count());
    if let Some(prices) = &result.last_prices {
        eprintln!("Gross Exposure:   {:.2}", result.state.gross_exposure(prices));
        eprintln!("Unrealized P&L:   {:.2}", result.state.unrealized_pnl(prices));
    }

    eprintln!("\n=== Per-Instrument Summary ===");
    let instruments: Vec<&str> = universe.series.instruments().collect();
    for row in instrument_rows(&instruments, &result) {
        eprintln!("{row}");
    }

    eprintln!("\n=== Performance ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("VaR (95%):        {:.2}%", metrics.var_95 * 100.0);
    eprintln!("Closing Fills:    {}", metrics.closing_fills);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Realized P&L:     {:.2}", metrics.realized_pnl);
    eprintln!("Total Fees:       {:.2}", metrics.total_fees);

    eprintln!(
        "\nReport written to: {} and {}",
        output_dir.join(FILLS_FILE).display(),
        output_dir.join(EQUITY_FILE).display()
    );

    match result.outcome {
        RunOutcome::Complete => ExitCode::SUCCESS,
        RunOutcome::Stopped => {
            eprintln!("Run stopped before the end of the data");
            ExitCode::SUCCESS
        }
        RunOutcome::Aborted { reason } => {
            eprintln!("error: run aborted: {reason}");
            ExitCode::from(5)
        }
    }
}

/// One line per instrument: fill count, realized P&L and the closing quantity.
pub fn instrument_rows(instruments: &[&str], report: &RunReport) -> Vec<String> {
    instruments
        .iter()
        .map(|id| {
            let (fills, realized) = report
                .log
                .for_instrument(id)
                .fold((0usize, 0.0f64), |(n, pnl), f| (n + 1, pnl + f.realized_pnl));
            format!(
                "{id:<10} fills: {fills:>4}  realized: {realized:>12.2}  held: {:>8}",
                report.state.quantity(id)
            )
        })
        .collect()
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let run_config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    eprintln!("\nData:");
    eprintln!("  path:        {}", run_config.data.path.display());
    eprintln!("  instruments: {}", run_config.data.instruments.join(", "));
    eprintln!("  range:       {} to {}", run_config.data.start, run_config.data.end);
    eprintln!("\nStrategy:");
    eprintln!("  kind:        {}", run_config.strategy.kind());
    eprintln!("  lookback:    {}", run_config.lookback);
    eprintln!("\nRisk:");
    eprintln!("  stop loss:   {:.1}%", run_config.risk.max_position_loss_pct() * 100.0);
    eprintln!("  take profit: {:.1}%", run_config.risk.max_position_gain_pct() * 100.0);
    eprintln!("  position:    {:.1}%", run_config.risk.max_position_pct() * 100.0);
    eprintln!("  gross:       {:.1}%", run_config.risk.max_gross_exposure_pct() * 100.0);
    if let Some(daily) = run_config.risk.max_daily_loss_pct() {
        eprintln!("  daily loss:  {:.1}%", daily * 100.0);
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, all: bool) -> ExitCode {
    let run_config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = CsvAdapter::new(run_config.data.path.clone());
    print_info(&data_port, &run_config, all)
}

pub fn print_info(data_port: &dyn DataPort, run_config: &RunConfig, all: bool) -> ExitCode {
    let instruments = if all {
        match data_port.list_instruments() {
            Ok(list) => list,
            Err(e) => return report_error(&e),
        }
    } else {
        run_config.data.instruments.clone()
    };

    if instruments.is_empty() {
        eprintln!("No instruments found in {}", run_config.data.path.display());
        return ExitCode::SUCCESS;
    }

    for instrument in &instruments {
        match data_port.data_range(instrument) {
            Ok(Some((first, last, count))) => {
                println!("{instrument}: {first} to {last} ({count} records)");
            }
            Ok(None) => println!("{instrument}: no data"),
            Err(e) => eprintln!("warning: {instrument}: {e}"),
        }
    }
    ExitCode::SUCCESS
}
