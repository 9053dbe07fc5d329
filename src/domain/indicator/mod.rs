//! Incremental indicator state.
//!
//! Indicators are updated one close at a time so a generator never has to
//! recompute from full history:
//! - `RollingMean`: simple moving average over the last `n` values
//! - `RollingCloses`: the last `n` values, for lagged comparisons
//!
//! Both report `None` until `n` values have been seen (the warmup period).

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingMean {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period + 1),
        }
    }

    pub fn update(&mut self, value: f64) {
        if self.period == 0 {
            return;
        }
        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.period > 0 && self.values.len() == self.period
    }

    /// Summed from the current window; values that have scrolled out leave
    /// no residue.
    pub fn value(&self) -> Option<f64> {
        self.is_ready()
            .then(|| self.values.iter().sum::<f64>() / self.period as f64)
    }
}

#[derive(Debug, Clone)]
pub struct RollingCloses {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingCloses {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn update(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.capacity > 0 && self.values.len() == self.capacity
    }

    /// (newest / oldest) - 1 once the buffer is full.
    pub fn rate_of_change(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        let oldest = *self.values.front()?;
        let newest = *self.values.back()?;
        (oldest != 0.0).then(|| newest / oldest - 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_warmup() {
        let mut sma = RollingMean::new(3);
        sma.update(10.0);
        sma.update(20.0);
        assert!(!sma.is_ready());
        assert_eq!(sma.value(), None);

        sma.update(30.0);
        assert!(sma.is_ready());
        assert!((sma.value().unwrap() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rolling_mean_slides() {
        let mut sma = RollingMean::new(3);
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            sma.update(v);
        }
        assert!((sma.value().unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_mean_unaffected_by_evicted_magnitudes() {
        let mut sma = RollingMean::new(3);
        for v in [1e16, 1e16, 1e16, 1.0, 1.0, 1.0] {
            sma.update(v);
        }
        assert_eq!(sma.value(), Some(1.0));
    }

    #[test]
    fn rolling_means_over_equal_windows_match_exactly() {
        let mut long_history = RollingMean::new(5);
        let mut fresh = RollingMean::new(5);
        for i in 0..100_000 {
            long_history.update(100.0 + (i % 7) as f64 * 0.1 + (i % 13) as f64 * 1e-3);
        }
        let tail = [100.3, 100.1, 100.7, 100.2, 100.5];
        for v in tail {
            long_history.update(v);
            fresh.update(v);
        }
        assert_eq!(long_history.value(), fresh.value());
    }

    #[test]
    fn rolling_mean_period_1_tracks_last_value() {
        let mut sma = RollingMean::new(1);
        sma.update(10.0);
        sma.update(25.0);
        assert!((sma.value().unwrap() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rolling_mean_period_0_never_ready() {
        let mut sma = RollingMean::new(0);
        sma.update(10.0);
        assert_eq!(sma.value(), None);
    }

    #[test]
    fn rate_of_change_over_buffer() {
        let mut closes = RollingCloses::new(3);
        closes.update(100.0);
        closes.update(105.0);
        assert_eq!(closes.rate_of_change(), None);

        closes.update(110.0);
        assert!((closes.rate_of_change().unwrap() - 0.10).abs() < 1e-9);

        closes.update(99.0);
        // oldest is now 105
        assert!((closes.rate_of_change().unwrap() - (99.0 / 105.0 - 1.0)).abs() < 1e-9);
    }
}
