//! Risk gate: turns raw signals into bounded orders.
//!
//! Per instrument, in priority order:
//! 1. stop-loss: return on cost <= -max_position_loss_pct forces an exit
//! 2. take-profit: return on cost >= max_position_gain_pct forces an exit
//! 3. concentration: |target| * price <= max_position_pct * equity
//! 4. gross exposure: the post-trade book's notional must fit within
//!    max_gross_exposure_pct * equity; signal-derived orders are scaled
//!    down pro rata, forced exits and unordered holdings are left alone
//! 5. orders whose target equals the held quantity are dropped

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::error::QuantloopError;
use super::market_data::PriceBook;
use super::order::{Order, OrderId, OrderReason};
use super::portfolio::PortfolioState;
use super::signal::SignalMap;

/// Largest share count an order may target; integers up to 2^53 are exact in f64.
const MAX_ORDER_QUANTITY: f64 = 9_007_199_254_740_992.0;

/// Validated risk limits. All percentages are fractions in (0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    max_position_loss_pct: f64,
    max_position_gain_pct: f64,
    max_position_pct: f64,
    max_gross_exposure_pct: f64,
    max_daily_loss_pct: Option<f64>,
    allow_shorting: bool,
}

fn check_fraction(key: &str, value: f64) -> Result<f64, QuantloopError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(QuantloopError::invalid(
            "risk",
            key,
            format!("{key} must be in (0, 1], got {value}"),
        ))
    }
}

impl RiskLimits {
    pub fn new(
        max_position_loss_pct: f64,
        max_position_gain_pct: f64,
        max_position_pct: f64,
        max_gross_exposure_pct: f64,
    ) -> Result<Self, QuantloopError> {
        Ok(RiskLimits {
            max_position_loss_pct: check_fraction("max_position_loss_pct", max_position_loss_pct)?,
            max_position_gain_pct: check_fraction("max_position_gain_pct", max_position_gain_pct)?,
            max_position_pct: check_fraction("max_position_pct", max_position_pct)?,
            max_gross_exposure_pct: check_fraction(
                "max_gross_exposure_pct",
                max_gross_exposure_pct,
            )?,
            max_daily_loss_pct: None,
            allow_shorting: false,
        })
    }

    pub fn with_max_daily_loss(mut self, pct: f64) -> Result<Self, QuantloopError> {
        self.max_daily_loss_pct = Some(check_fraction("max_daily_loss_pct", pct)?);
        Ok(self)
    }

    pub fn with_shorting(mut self, allow_shorting: bool) -> Self {
        self.allow_shorting = allow_shorting;
        self
    }

    pub fn max_position_loss_pct(&self) -> f64 {
        self.max_position_loss_pct
    }

    pub fn max_position_gain_pct(&self) -> f64 {
        self.max_position_gain_pct
    }

    pub fn max_position_pct(&self) -> f64 {
        self.max_position_pct
    }

    pub fn max_gross_exposure_pct(&self) -> f64 {
        self.max_gross_exposure_pct
    }

    pub fn max_daily_loss_pct(&self) -> Option<f64> {
        self.max_daily_loss_pct
    }

    pub fn allow_shorting(&self) -> bool {
        self.allow_shorting
    }
}

/// Filters signals into admissible orders against the current ledger.
pub trait RiskGate {
    fn evaluate(
        &mut self,
        signals: &SignalMap,
        state: &PortfolioState,
        prices: &PriceBook,
    ) -> Vec<Order>;
}

#[derive(Debug, Clone, Copy)]
struct Planned {
    target: i64,
    reason: OrderReason,
    price: f64,
}

/// The limit-based gate described in the module docs.
#[derive(Debug, Clone)]
pub struct LimitRiskGate {
    limits: RiskLimits,
    next_id: u64,
}

impl LimitRiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits, next_id: 1 }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    fn issue_id(&mut self) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        id
    }

    fn forced_exits(
        &self,
        state: &PortfolioState,
        prices: &PriceBook,
        plans: &mut BTreeMap<String, Planned>,
    ) {
        let timestamp = prices.timestamp();
        for (instrument, position) in &state.positions {
            let Some(price) = prices.close(instrument) else {
                continue;
            };
            let ret = position.return_pct(price);
            let trigger = if ret <= -self.limits.max_position_loss_pct {
                "stop-loss"
            } else if ret >= self.limits.max_position_gain_pct {
                "take-profit"
            } else {
                continue;
            };
            info!(
                instrument = %instrument,
                %timestamp,
                return_pct = ret,
                quantity = position.quantity,
                trigger,
                "forced exit"
            );
            plans.insert(
                instrument.clone(),
                Planned {
                    target: 0,
                    reason: OrderReason::ForcedExit,
                    price,
                },
            );
        }
    }

    fn daily_loss_halt(&self, state: &PortfolioState, equity: f64) -> bool {
        match (self.limits.max_daily_loss_pct, state.last_equity()) {
            (Some(pct), Some(previous)) if previous > 0.0 => (previous - equity) / previous > pct,
            _ => false,
        }
    }

    fn size_signals(
        &self,
        signals: &SignalMap,
        state: &PortfolioState,
        prices: &PriceBook,
        equity: f64,
        plans: &mut BTreeMap<String, Planned>,
    ) {
        let timestamp = prices.timestamp();
        let halt = self.daily_loss_halt(state, equity);
        if halt {
            warn!(%timestamp, equity, "daily loss limit breached, new exposure blocked");
        }

        for (instrument, signal) in signals {
            if plans.contains_key(instrument) {
                debug!(instrument = %instrument, %timestamp, "signal overridden by forced exit");
                continue;
            }
            let Some(price) = prices.close(instrument).filter(|p| *p > 0.0) else {
                warn!(instrument = %instrument, %timestamp, "no price for signal, skipped");
                continue;
            };

            let mut reason = OrderReason::Signal;
            let mut requested = (signal.strength * equity / price).trunc();

            if requested < 0.0 && !self.limits.allow_shorting {
                requested = 0.0;
                reason = OrderReason::RiskAdjusted;
            }

            // Bounded in f64 so the cast below cannot saturate.
            let max_quantity = (self.limits.max_position_pct * equity / price)
                .floor()
                .min(MAX_ORDER_QUANTITY);
            if requested.abs() > max_quantity {
                debug!(
                    instrument = %instrument,
                    %timestamp,
                    requested,
                    max_quantity,
                    "concentration clamp"
                );
                requested = requested.clamp(-max_quantity, max_quantity);
                reason = OrderReason::RiskAdjusted;
            }
            let mut target = requested as i64;

            if halt {
                let held = state.quantity(instrument);
                let capped = target.clamp(held.min(0), held.max(0));
                if capped != target {
                    target = capped;
                    reason = OrderReason::RiskAdjusted;
                }
            }

            plans.insert(
                instrument.clone(),
                Planned {
                    target,
                    reason,
                    price,
                },
            );
        }
    }

    fn scale_gross_exposure(
        &self,
        state: &PortfolioState,
        prices: &PriceBook,
        equity: f64,
        plans: &mut BTreeMap<String, Planned>,
    ) {
        let budget = self.limits.max_gross_exposure_pct * equity;
        let unordered: f64 = state
            .positions
            .iter()
            .filter(|(instrument, _)| !plans.contains_key(*instrument))
            .map(|(_, pos)| pos.notional(state.mark_price(pos, prices)))
            .sum();
        let scalable: f64 = plans
            .values()
            .filter(|p| p.reason != OrderReason::ForcedExit)
            .map(|p| p.target.unsigned_abs() as f64 * p.price)
            .sum();

        let available = (budget - unordered).max(0.0);
        if scalable <= available || scalable <= 0.0 {
            return;
        }

        let factor = available / scalable;
        info!(
            timestamp = %prices.timestamp(),
            requested = scalable,
            available,
            factor,
            "gross exposure limit, scaling signal orders"
        );
        for plan in plans
            .values_mut()
            .filter(|p| p.reason != OrderReason::ForcedExit)
        {
            let scaled = (plan.target as f64 * factor).trunc() as i64;
            if scaled != plan.target {
                plan.target = scaled;
                plan.reason = OrderReason::RiskAdjusted;
            }
        }
    }
}

impl RiskGate for LimitRiskGate {
    fn evaluate(
        &mut self,
        signals: &SignalMap,
        state: &PortfolioState,
        prices: &PriceBook,
    ) -> Vec<Order> {
        let timestamp = prices.timestamp();
        let equity = state.total_equity(prices);
        let mut plans: BTreeMap<String, Planned> = BTreeMap::new();

        self.forced_exits(state, prices, &mut plans);

        if equity > 0.0 {
            self.size_signals(signals, state, prices, equity, &mut plans);
            self.scale_gross_exposure(state, prices, equity, &mut plans);
        } else if !signals.is_empty() {
            warn!(%timestamp, equity, "non-positive equity, signals ignored");
        }

        let mut orders = Vec::with_capacity(plans.len());
        for (instrument, plan) in plans {
            if plan.target == state.quantity(&instrument) {
                continue;
            }
            orders.push(Order {
                id: self.issue_id(),
                instrument_id: instrument,
                timestamp,
                target_quantity: plan.target,
                reason: plan.reason,
            });
        }
        orders
    }
}
