use std::collections::VecDeque;

use tracing::debug;

/// Number of prior sessions averaged into the volatility factor.
pub const VOLATILITY_LOOKBACK: usize = 14;

/// Rolling set of historical intraday move ratios, one per prior session.
///
/// A move ratio is the session's range relative to its opening price.
#[derive(Debug, Clone, Default)]
pub struct VolatilityEstimator {
    ratios: VecDeque<f64>,
}

impl VolatilityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configured history, oldest first. Only the newest
    /// `VOLATILITY_LOOKBACK` valid values are kept.
    pub fn seeded(history: &[f64]) -> Self {
        let mut estimator = Self::new();
        for &ratio in history {
            estimator.record(ratio);
        }
        estimator
    }

    pub fn record(&mut self, ratio: f64) {
        if !(ratio.is_finite() && ratio >= 0.0) {
            debug!(ratio, "Ignoring invalid move ratio");
            return;
        }
        self.ratios.push_back(ratio);
        while self.ratios.len() > VOLATILITY_LOOKBACK {
            self.ratios.pop_front();
        }
    }

    /// Record a finished session from its open, high and low.
    pub fn record_session(&mut self, open: f64, high: f64, low: f64) {
        if open > 0.0 && high >= low {
            self.record((high - low) / open);
        }
    }

    /// Mean of the held ratios; `None` before any session is recorded.
    pub fn volatility_factor(&self) -> Option<f64> {
        if self.ratios.is_empty() {
            return None;
        }
        Some(self.ratios.iter().sum::<f64>() / self.ratios.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}
