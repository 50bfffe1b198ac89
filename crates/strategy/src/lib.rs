pub mod candles;
pub mod concretum;
pub mod config;
pub mod indicators;
pub mod opening_candle;
pub mod registry;
pub mod vwap_trend;

pub use candles::{Candle, CandleAggregator, CandleConfig, Timeframe};
pub use concretum::ConcretumBands;
pub use config::StrategySet;
pub use indicators::{IndicatorBank, IndicatorConfig, MaWindow, VolatilityEstimator};
pub use opening_candle::OpeningCandle;
pub use registry::StrategyRegistry;
pub use vwap_trend::VwapTrend;

use chrono::{DateTime, Utc};

use common::{IndicatorSnapshot, MarketHours, Position, Result, RiskProfile, Signal, StrategyId};

/// Read-only view of market state handed to each strategy evaluation.
pub struct MarketContext<'a> {
    /// Evaluation time.
    pub now: DateTime<Utc>,
    pub hours: &'a MarketHours,
    pub candles: &'a CandleAggregator,
    pub indicators: IndicatorSnapshot,
    pub volatility_factor: Option<f64>,
    /// First traded price of the current session.
    pub session_open: Option<f64>,
}

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    fn risk_profile(&self) -> RiskProfile {
        RiskProfile::Base
    }

    /// Evaluate the latest market state against this strategy's rules.
    ///
    /// `position` is the strategy's own open position, if any. Implementations
    /// act at most once per sealed candle, so re-evaluating without new data
    /// yields `Ok(None)`. Missing or warming-up inputs return
    /// `Error::DataNotReady`.
    fn evaluate(&mut self, ctx: &MarketContext<'_>, position: Option<&Position>) -> Result<Option<Signal>>;
}
