//! Order execution, fill simulation and the transaction log.
//!
//! Fill price is the close at the order timestamp moved against the trader
//! by the slippage model: buys fill at `close * (1 + bps / 10_000)`, sells
//! at `close * (1 - bps / 10_000)`. Fees come from the fee model and are
//! charged on the executed notional.

use serde::Serialize;
use tracing::{debug, warn};

use chrono::NaiveDateTime;

use super::error::QuantloopError;
use super::market_data::PriceBook;
use super::order::{Order, OrderId, OrderReason};
use super::portfolio::PortfolioState;

const BPS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlippageModel {
    /// Constant basis points on every fill.
    FixedBps(f64),
    /// `bps` scaled by the order's share of the bar volume, capped at the
    /// full `bps`. A bar with no volume takes the full `bps`.
    VolumeProportional { bps: f64 },
}

impl SlippageModel {
    pub fn effective_bps(&self, quantity: i64, volume: u64) -> f64 {
        match *self {
            SlippageModel::FixedBps(bps) => bps,
            SlippageModel::VolumeProportional { bps } => {
                if volume == 0 {
                    bps
                } else {
                    let participation = quantity.unsigned_abs() as f64 / volume as f64;
                    bps * participation.min(1.0)
                }
            }
        }
    }

    /// Execution price for a signed quantity change at `close`.
    pub fn fill_price(&self, close: f64, delta: i64, volume: u64) -> f64 {
        let bps = self.effective_bps(delta, volume);
        if delta > 0 {
            close * (1.0 + bps / BPS)
        } else {
            close * (1.0 - bps / BPS)
        }
    }

    fn bps(&self) -> f64 {
        match *self {
            SlippageModel::FixedBps(bps) => bps,
            SlippageModel::VolumeProportional { bps } => bps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeModel {
    /// Fixed amount per fill.
    Flat { per_fill: f64 },
    /// Fraction of executed notional.
    Proportional { rate: f64 },
}

impl FeeModel {
    pub fn fee(&self, notional: f64) -> f64 {
        match *self {
            FeeModel::Flat { per_fill } => per_fill,
            FeeModel::Proportional { rate } => notional.abs() * rate,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            FeeModel::Flat { per_fill } => per_fill,
            FeeModel::Proportional { rate } => rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub slippage: SlippageModel,
    pub fee: FeeModel,
    pub allow_margin: bool,
}

impl ExecutionConfig {
    pub fn new(
        slippage: SlippageModel,
        fee: FeeModel,
        allow_margin: bool,
    ) -> Result<Self, QuantloopError> {
        let bps = slippage.bps();
        if !bps.is_finite() || bps < 0.0 {
            return Err(QuantloopError::invalid(
                "execution",
                "slippage_bps",
                format!("slippage_bps must be non-negative, got {bps}"),
            ));
        }
        if bps >= BPS {
            return Err(QuantloopError::invalid(
                "execution",
                "slippage_bps",
                format!("slippage_bps must be below {BPS}, got {bps}"),
            ));
        }
        let fee_value = fee.value();
        if !fee_value.is_finite() || fee_value < 0.0 {
            return Err(QuantloopError::invalid(
                "execution",
                "fee_value",
                format!("fee_value must be non-negative, got {fee_value}"),
            ));
        }
        Ok(Self {
            slippage,
            fee,
            allow_margin,
        })
    }

    /// No slippage, no fees, no margin.
    pub fn frictionless() -> Self {
        Self {
            slippage: SlippageModel::FixedBps(0.0),
            fee: FeeModel::Flat { per_fill: 0.0 },
            allow_margin: false,
        }
    }
}

/// Executed order. `executed_quantity` is the signed change in position;
/// `slippage_applied` is the monetary cost of slippage on this fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub instrument_id: String,
    pub timestamp: NaiveDateTime,
    pub reason: OrderReason,
    pub executed_quantity: i64,
    pub executed_price: f64,
    pub slippage_applied: f64,
    pub fee: f64,
    pub realized_pnl: f64,
    /// Reduced or closed an existing position.
    pub closing: bool,
}

/// An order the engine refused; the rest of its batch still runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub order_id: OrderId,
    pub instrument_id: String,
    pub timestamp: NaiveDateTime,
    pub reason: String,
}

/// Applies risk-approved orders to the ledger.
pub trait ExecutionEngine {
    /// Execute `orders` against `prices`, mutating `state`, and append one
    /// equity sample. Per-order failures are rejections, not errors; an
    /// `Err` means the ledger is inconsistent.
    fn apply(
        &mut self,
        orders: &[Order],
        prices: &PriceBook,
        state: &mut PortfolioState,
    ) -> Result<Vec<Fill>, QuantloopError>;

    /// Rejections from the most recent `apply`.
    fn rejections(&self) -> &[Rejection];
}

/// Full-fill simulator at the bar close.
#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    config: ExecutionConfig,
    rejections: Vec<Rejection>,
}

impl SimulatedExecution {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            rejections: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn reject(&mut self, order: &Order, error: QuantloopError) {
        warn!(
            order = %order.id,
            instrument = %order.instrument_id,
            timestamp = %order.timestamp,
            error = %error,
            "order rejected"
        );
        self.rejections.push(Rejection {
            order_id: order.id,
            instrument_id: order.instrument_id.clone(),
            timestamp: order.timestamp,
            reason: error.to_string(),
        });
    }

    fn execute_one(
        &mut self,
        order: &Order,
        prices: &PriceBook,
        state: &mut PortfolioState,
    ) -> Option<Fill> {
        let held = state.quantity(&order.instrument_id);
        let delta = order.delta_from(held);
        if delta == 0 {
            debug!(order = %order.id, instrument = %order.instrument_id, "no-op order skipped");
            return None;
        }

        let Some(quote) = prices.quote_at(&order.instrument_id, order.timestamp) else {
            self.reject(
                order,
                QuantloopError::MissingPrice {
                    instrument: order.instrument_id.clone(),
                    timestamp: order.timestamp,
                },
            );
            return None;
        };

        let price = self
            .config
            .slippage
            .fill_price(quote.close, delta, quote.volume);
        let quantity = delta.unsigned_abs() as f64;
        let fee = self.config.fee.fee(quantity * price);
        let required = delta as f64 * price + fee;

        if !self.config.allow_margin && state.cash - required < 0.0 {
            self.reject(
                order,
                QuantloopError::InsufficientCash {
                    instrument: order.instrument_id.clone(),
                    required,
                    available: state.cash,
                },
            );
            return None;
        }

        let realized_pnl = state.apply_fill(&order.instrument_id, delta, price, fee);
        debug!(
            order = %order.id,
            instrument = %order.instrument_id,
            quantity = delta,
            price,
            fee,
            "filled"
        );

        Some(Fill {
            order_id: order.id,
            instrument_id: order.instrument_id.clone(),
            timestamp: order.timestamp,
            reason: order.reason,
            executed_quantity: delta,
            executed_price: price,
            slippage_applied: (price - quote.close).abs() * quantity,
            fee,
            realized_pnl,
            closing: held != 0 && held.signum() != delta.signum(),
        })
    }
}

/// Forced exits, then reductions, then everything else.
fn sequence_class(order: &Order, held: i64) -> u8 {
    if order.is_forced_exit() {
        0
    } else if order.reduces_exposure(held) {
        1
    } else {
        2
    }
}

impl ExecutionEngine for SimulatedExecution {
    fn apply(
        &mut self,
        orders: &[Order],
        prices: &PriceBook,
        state: &mut PortfolioState,
    ) -> Result<Vec<Fill>, QuantloopError> {
        self.rejections.clear();

        let mut sequenced: Vec<&Order> = orders.iter().collect();
        sequenced.sort_by_key(|o| sequence_class(o, state.quantity(&o.instrument_id)));

        let mut fills = Vec::with_capacity(sequenced.len());
        for order in sequenced {
            if let Some(fill) = self.execute_one(order, prices, state) {
                fills.push(fill);
            }
        }

        for fill in &fills {
            let target = orders
                .iter()
                .find(|o| o.id == fill.order_id)
                .map(|o| o.target_quantity);
            let held = state.quantity(&fill.instrument_id);
            if target != Some(held) {
                return Err(QuantloopError::InvariantViolation {
                    reason: format!(
                        "{} holds {held} after fill of {}, expected {target:?}",
                        fill.instrument_id, fill.order_id
                    ),
                });
            }
        }

        let equity = state.total_equity(prices);
        state.record_equity(prices.timestamp(), equity);
        Ok(fills)
    }

    fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }
}

/// Append-only record of committed fills.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionLog {
    fills: Vec<Fill>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend(&mut self, fills: impl IntoIterator<Item = Fill>) {
        self.fills.extend(fills);
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn len(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    pub fn for_instrument<'a>(&'a self, instrument: &'a str) -> impl Iterator<Item = &'a Fill> {
        self.fills
            .iter()
            .filter(move |f| f.instrument_id == instrument)
    }
}
