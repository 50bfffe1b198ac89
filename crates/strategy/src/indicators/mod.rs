pub mod sma;
pub mod volatility;
pub mod vwap;

pub use sma::RollingSma;
pub use volatility::{VolatilityEstimator, VOLATILITY_LOOKBACK};
pub use vwap::RollingVwap;

use serde::{Deserialize, Serialize};

use common::{Error, IndicatorSnapshot, Result};

/// The moving averages the strategies depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaWindow {
    Ma300,
    Ma350,
    Ma400,
}

/// Indicator window lengths. Defaults are the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ma300_len: usize,
    pub ma350_len: usize,
    pub ma400_len: usize,
    pub vwap_len: usize,
    /// Volume assumed for samples that carry none.
    pub default_volume: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ma300_len: 300,
            ma350_len: 350,
            ma400_len: 400,
            vwap_len: 100,
            default_volume: 1.0,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        let lens = [
            ("ma300_len", self.ma300_len),
            ("ma350_len", self.ma350_len),
            ("ma400_len", self.ma400_len),
            ("vwap_len", self.vwap_len),
        ];
        if let Some((name, _)) = lens.iter().find(|(_, len)| *len == 0) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if !(self.default_volume.is_finite() && self.default_volume >= 0.0) {
            return Err(Error::Config("default_volume must be non-negative".into()));
        }
        Ok(())
    }
}

/// Rolling per-sample indicators shared by all strategies.
#[derive(Debug, Clone)]
pub struct IndicatorBank {
    ma300: RollingSma,
    ma350: RollingSma,
    ma400: RollingSma,
    vwap: RollingVwap,
    default_volume: f64,
}

impl IndicatorBank {
    pub fn new(cfg: &IndicatorConfig) -> Self {
        Self {
            ma300: RollingSma::new(cfg.ma300_len),
            ma350: RollingSma::new(cfg.ma350_len),
            ma400: RollingSma::new(cfg.ma400_len),
            vwap: RollingVwap::new(cfg.vwap_len),
            default_volume: cfg.default_volume,
        }
    }

    pub fn update(&mut self, price: f64, volume: Option<f64>) {
        self.ma300.push(price);
        self.ma350.push(price);
        self.ma400.push(price);
        self.vwap.push(price, volume.unwrap_or(self.default_volume));
    }

    pub fn is_ready(&self, window: MaWindow) -> bool {
        self.ma(window).is_ready()
    }

    pub fn ma(&self, window: MaWindow) -> &RollingSma {
        match window {
            MaWindow::Ma300 => &self.ma300,
            MaWindow::Ma350 => &self.ma350,
            MaWindow::Ma400 => &self.ma400,
        }
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ma300: self.ma300.value(),
            ma350: self.ma350.value(),
            ma400: self.ma400.value(),
            vwap: self.vwap.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> IndicatorConfig {
        IndicatorConfig {
            ma300_len: 2,
            ma350_len: 3,
            ma400_len: 4,
            vwap_len: 3,
            default_volume: 1.0,
        }
    }

    #[test]
    fn each_average_becomes_ready_at_its_own_length() {
        let mut bank = IndicatorBank::new(&small());
        bank.update(10.0, None);
        bank.update(20.0, None);
        assert!(bank.is_ready(MaWindow::Ma300));
        assert!(!bank.is_ready(MaWindow::Ma350));

        bank.update(30.0, None);
        let snap = bank.snapshot();
        assert_eq!(snap.ma300, Some(25.0));
        assert_eq!(snap.ma350, Some(20.0));
        assert_eq!(snap.ma400, None);
        assert_eq!(snap.vwap, Some(20.0));
    }

    #[test]
    fn missing_volume_uses_default() {
        let mut bank = IndicatorBank::new(&small());
        bank.update(100.0, Some(3.0));
        bank.update(200.0, None);
        assert_eq!(bank.snapshot().vwap, Some(125.0));
    }

    #[test]
    fn production_windows_fill_exactly() {
        let mut bank = IndicatorBank::new(&IndicatorConfig::default());
        for i in 0..399 {
            bank.update(100.0 + i as f64, Some(1.0));
        }
        assert!(bank.is_ready(MaWindow::Ma350));
        assert!(!bank.is_ready(MaWindow::Ma400));
        bank.update(500.0, Some(1.0));
        assert!(bank.is_ready(MaWindow::Ma400));
        assert_eq!(bank.ma(MaWindow::Ma300).len(), 300);
        assert_eq!(bank.ma(MaWindow::Ma400).len(), 400);
    }

    #[test]
    fn rejects_zero_length_windows() {
        let cfg = IndicatorConfig {
            vwap_len: 0,
            ..IndicatorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
