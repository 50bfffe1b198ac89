use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, InstrumentConfig, MarketHours, Result, RiskSettings, SessionConfig};
use risk::RiskLimits;
use strategy::{CandleConfig, IndicatorConfig, StrategySet};

/// Order placement retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on a single broker call.
    pub attempt_timeout_ms: u64,
    /// Seconds between broker position checks while running. 0 disables.
    pub reconcile_interval_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2_000,
            attempt_timeout_ms: 10_000,
            reconcile_interval_secs: 60,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Prior sessions' move ratios, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub history: Vec<f64>,
}

/// Market data watchdog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Seconds without a market event before connectivity is considered lost.
    pub stale_after_secs: u64,
    pub watchdog_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 30,
            watchdog_interval_ms: 1_000,
        }
    }
}

/// Engine parameters, read from a TOML file. Every section is optional.
///
/// ```toml
/// [instrument]
/// symbol = "MNQ"
///
/// [risk]
/// max_risk_per_trade = 125.0
/// daily_loss_limit = 500.0
///
/// [execution]
/// max_retries = 3
/// retry_delay_ms = 2000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub candles: CandleConfig,
    pub indicators: IndicatorConfig,
    pub instrument: InstrumentConfig,
    pub risk: RiskSettings,
    pub limits: RiskLimits,
    pub execution: ExecutionConfig,
    pub volatility: VolatilityConfig,
    pub strategies: StrategySet,
    pub feed: FeedConfig,
}

impl EngineConfig {
    /// Read and validate the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), symbol = %cfg.instrument.symbol, "Engine configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw).map_err(|e| Error::Config(format!("invalid engine config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        MarketHours::new(&self.session)?;
        self.indicators.validate()?;
        self.instrument.validate()?;
        self.risk.validate()?;
        self.limits.validate()?;

        if self.execution.max_retries == 0 {
            return Err(Error::Config("execution.max_retries must be at least 1".into()));
        }
        if self.execution.attempt_timeout_ms == 0 {
            return Err(Error::Config("execution.attempt_timeout_ms must be positive".into()));
        }
        if self.feed.stale_after_secs == 0 || self.feed.watchdog_interval_ms == 0 {
            return Err(Error::Config("feed watchdog intervals must be positive".into()));
        }
        if self.candles.retention_1m < 2 || self.candles.retention_5m == 0 || self.candles.retention_15m == 0 {
            return Err(Error::Config("candle retention too small".into()));
        }
        if let Some(bad) = self.volatility.history.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
            return Err(Error::Config(format!("volatility history contains invalid ratio {bad}")));
        }
        Ok(())
    }
}
