//! Risk-approved orders.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderReason {
    /// Sized straight from the signal.
    Signal,
    /// Sized from the signal, then reduced by a risk limit.
    RiskAdjusted,
    /// Stop-loss or take-profit exit; never scaled.
    ForcedExit,
}

impl fmt::Display for OrderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderReason::Signal => write!(f, "SIGNAL"),
            OrderReason::RiskAdjusted => write!(f, "RISK_ADJUSTED"),
            OrderReason::ForcedExit => write!(f, "FORCED_EXIT"),
        }
    }
}

/// Target position for one instrument. `target_quantity` is the position to
/// hold after the fill, not the change.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub instrument_id: String,
    pub timestamp: NaiveDateTime,
    pub target_quantity: i64,
    pub reason: OrderReason,
}

impl Order {
    pub fn is_forced_exit(&self) -> bool {
        self.reason == OrderReason::ForcedExit
    }

    /// Quantity change needed from `held` to reach the target.
    pub fn delta_from(&self, held: i64) -> i64 {
        self.target_quantity - held
    }

    /// True when the order moves the position toward flat without flipping.
    pub fn reduces_exposure(&self, held: i64) -> bool {
        self.target_quantity.unsigned_abs() < held.unsigned_abs()
            && (self.target_quantity == 0 || self.target_quantity.signum() == held.signum())
    }
}
