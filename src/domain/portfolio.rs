//! Portfolio state and equity tracking.
//!
//! `PortfolioState` is the single mutable ledger of a run. Risk gates read
//! it; only an execution engine writes it, through [`PortfolioState::apply_fill`].

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::QuantloopError;
use super::market_data::PriceBook;
use super::position::Position;

/// Cash may dip this far below zero from float rounding before it counts as
/// negative.
const CASH_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub realized_pnl: f64,
    pub total_fees: f64,
    pub equity_curve: Vec<EquityPoint>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioState {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            realized_pnl: 0.0,
            total_fees: 0.0,
            equity_curve: Vec::new(),
        }
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Held quantity, zero when flat.
    pub fn quantity(&self, instrument: &str) -> i64 {
        self.positions.get(instrument).map_or(0, |p| p.quantity)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Valuation price: the latest quote, or average cost when the book has
    /// never quoted the instrument.
    pub fn mark_price(&self, position: &Position, prices: &PriceBook) -> f64 {
        prices
            .close(&position.instrument_id)
            .unwrap_or(position.average_cost)
    }

    /// cash + sum(quantity * price)
    pub fn total_equity(&self, prices: &PriceBook) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| pos.market_value(self.mark_price(pos, prices)))
            .sum();
        self.cash + position_value
    }

    /// sum(|quantity| * price) across held positions.
    pub fn gross_exposure(&self, prices: &PriceBook) -> f64 {
        self.positions
            .values()
            .map(|pos| pos.notional(self.mark_price(pos, prices)))
            .sum()
    }

    pub fn unrealized_pnl(&self, prices: &PriceBook) -> f64 {
        self.positions
            .values()
            .map(|pos| pos.unrealized_pnl(self.mark_price(pos, prices)))
            .sum()
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    pub fn last_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }

    /// Book a fill: move the position, settle `delta * price + fee` against
    /// cash, and accumulate realized P&L and fees. Returns the realized P&L.
    pub fn apply_fill(&mut self, instrument: &str, delta: i64, price: f64, fee: f64) -> f64 {
        let position = self
            .positions
            .entry(instrument.to_string())
            .or_insert_with(|| Position::flat(instrument));
        let realized = position.apply(delta, price);
        if position.is_flat() {
            self.positions.remove(instrument);
        }

        self.cash -= delta as f64 * price + fee;
        self.realized_pnl += realized;
        self.total_fees += fee;
        realized
    }

    /// Ledger invariants that must hold after every committed step.
    pub fn check_invariants(
        &self,
        prices: &PriceBook,
        allow_margin: bool,
        equity_floor: f64,
    ) -> Result<(), QuantloopError> {
        if !self.cash.is_finite() {
            return Err(QuantloopError::InvariantViolation {
                reason: format!("cash is not finite: {}", self.cash),
            });
        }
        if !allow_margin && self.cash < -CASH_TOLERANCE {
            return Err(QuantloopError::InvariantViolation {
                reason: format!("negative cash without margin: {:.2}", self.cash),
            });
        }
        for (key, pos) in &self.positions {
            if pos.is_flat() {
                return Err(QuantloopError::InvariantViolation {
                    reason: format!("flat position left in ledger for {key}"),
                });
            }
            if *key != pos.instrument_id {
                return Err(QuantloopError::InvariantViolation {
                    reason: format!(
                        "ledger key {key} holds position for {}",
                        pos.instrument_id
                    ),
                });
            }
        }
        let equity = self.total_equity(prices);
        if equity < equity_floor {
            return Err(QuantloopError::InvariantViolation {
                reason: format!("equity {equity:.2} below floor {equity_floor:.2}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_position(instrument: &str, quantity: i64, average_cost: f64) -> Position {
        Position {
            instrument_id: instrument.to_string(),
            quantity,
            average_cost,
        }
    }

    #[test]
    fn new_portfolio() {
        let state = PortfolioState::new(100_000.0);
        assert!((state.cash - 100_000.0).abs() < f64::EPSILON);
        assert!(state.positions.is_empty());
        assert!(state.equity_curve.is_empty());
        assert_eq!(state.realized_pnl, 0.0);
    }

    #[test]
    fn total_equity_no_positions() {
        let state = PortfolioState::new(100_000.0);
        let book = PriceBook::new(ts());
        assert!((state.total_equity(&book) - 100_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_long_and_short() {
        let mut state = PortfolioState::new(100_000.0);
        state.cash = 95_000.0;
        state
            .positions
            .insert("AAA".into(), sample_position("AAA", 100, 100.0));
        state
            .positions
            .insert("BBB".into(), sample_position("BBB", -50, 100.0));

        let book = PriceBook::new(ts())
            .with_quote("AAA", 110.0, 1000)
            .with_quote("BBB", 90.0, 1000);

        // 95000 + 11000 - 4500
        assert!((state.total_equity(&book) - 101_500.0).abs() < 1e-9);
        assert!((state.gross_exposure(&book) - 15_500.0).abs() < 1e-9);
        assert!((state.unrealized_pnl(&book) - 1_500.0).abs() < 1e-9);
    }

    #[test]
    fn unquoted_position_marked_at_cost() {
        let mut state = PortfolioState::new(10_000.0);
        state.cash = 5_000.0;
        state
            .positions
            .insert("AAA".into(), sample_position("AAA", 100, 50.0));
        let book = PriceBook::new(ts());
        assert!((state.total_equity(&book) - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn apply_fill_buy_then_close() {
        let mut state = PortfolioState::new(10_000.0);
        state.apply_fill("AAA", 100, 50.0, 5.0);
        assert!((state.cash - 4_995.0).abs() < 1e-9);
        assert_eq!(state.quantity("AAA"), 100);

        let realized = state.apply_fill("AAA", -100, 55.0, 5.0);
        assert!((realized - 500.0).abs() < 1e-9);
        assert!(state.position("AAA").is_none());
        assert!((state.cash - 10_490.0).abs() < 1e-9);
        assert!((state.realized_pnl - 500.0).abs() < 1e-9);
        assert!((state.total_fees - 10.0).abs() < 1e-9);
    }

    #[test]
    fn record_equity_appends() {
        let mut state = PortfolioState::new(100_000.0);
        state.record_equity(ts(), 105_000.0);
        assert_eq!(state.equity_curve.len(), 1);
        assert_eq!(state.last_equity(), Some(105_000.0));
    }

    #[test]
    fn invariants_hold_for_fresh_state() {
        let state = PortfolioState::new(100_000.0);
        assert!(state.check_invariants(&PriceBook::new(ts()), false, 0.0).is_ok());
    }

    #[test]
    fn negative_cash_violates_without_margin() {
        let mut state = PortfolioState::new(100.0);
        state.cash = -1.0;
        let book = PriceBook::new(ts());
        assert!(matches!(
            state.check_invariants(&book, false, -1_000.0),
            Err(QuantloopError::InvariantViolation { .. })
        ));
        assert!(state.check_invariants(&book, true, -1_000.0).is_ok());
    }

    #[test]
    fn equity_below_floor_violates() {
        let state = PortfolioState::new(100.0);
        let book = PriceBook::new(ts());
        assert!(state.check_invariants(&book, false, 500.0).is_err());
    }

    #[test]
    fn flat_position_in_ledger_violates() {
        let mut state = PortfolioState::new(100.0);
        state
            .positions
            .insert("AAA".into(), sample_position("AAA", 0, 0.0));
        assert!(state.check_invariants(&PriceBook::new(ts()), false, 0.0).is_err());
    }
}
