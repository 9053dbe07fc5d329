//! Position tracking with weighted-average-cost accounting.

/// Signed holding in one instrument. Positive quantity is long, negative is
/// short. `average_cost` is zero when the position is flat.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument_id: String,
    pub quantity: i64,
    pub average_cost: f64,
}

impl Position {
    pub fn flat(instrument_id: &str) -> Self {
        Position {
            instrument_id: instrument_id.to_string(),
            quantity: 0,
            average_cost: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Signed value: `quantity * price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Absolute value: `|quantity| * price`.
    pub fn notional(&self, price: f64) -> f64 {
        self.quantity.unsigned_abs() as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.average_cost)
    }

    /// Return on cost in the position's direction: a long that fell 6% and a
    /// short that rose 6% both report -0.06.
    pub fn return_pct(&self, price: f64) -> f64 {
        if self.is_flat() || self.average_cost <= 0.0 {
            return 0.0;
        }
        let change = (price - self.average_cost) / self.average_cost;
        if self.is_long() { change } else { -change }
    }

    /// Apply a signed quantity change at `price` and return the realized P&L.
    ///
    /// Increases blend into `average_cost`. Decreases realize
    /// `closed * (price - average_cost)` in the position's direction and
    /// leave `average_cost` unchanged. A flip through zero opens the
    /// remainder at `price`.
    pub fn apply(&mut self, delta: i64, price: f64) -> f64 {
        if delta == 0 {
            return 0.0;
        }

        let current = self.quantity;
        if current == 0 || current.signum() == delta.signum() {
            let held = current.unsigned_abs() as f64;
            let added = delta.unsigned_abs() as f64;
            self.average_cost = (held * self.average_cost + added * price) / (held + added);
            self.quantity += delta;
            return 0.0;
        }

        let closed = delta.unsigned_abs().min(current.unsigned_abs()) as f64;
        let realized = closed * (price - self.average_cost) * current.signum() as f64;
        self.quantity += delta;

        if self.quantity == 0 {
            self.average_cost = 0.0;
        } else if self.quantity.signum() != current.signum() {
            self.average_cost = price;
        }

        realized
    }
}
