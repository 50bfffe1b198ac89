use serde::{Deserialize, Serialize};

use common::StrategyId;

/// Which strategies the engine runs.
///
/// Example `[strategies]` table:
/// ```toml
/// [strategies]
/// opening_candle = true
/// vwap_trend = true
/// concretum_bands = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySet {
    pub opening_candle: bool,
    pub vwap_trend: bool,
    pub concretum_bands: bool,
}

impl Default for StrategySet {
    fn default() -> Self {
        Self {
            opening_candle: true,
            vwap_trend: true,
            concretum_bands: true,
        }
    }
}

impl StrategySet {
    pub fn is_enabled(&self, id: StrategyId) -> bool {
        match id {
            StrategyId::OpeningCandle => self.opening_candle,
            StrategyId::VwapTrend => self.vwap_trend,
            StrategyId::ConcretumBands => self.concretum_bands,
        }
    }

    /// Only the given strategy enabled.
    pub fn only(id: StrategyId) -> Self {
        Self {
            opening_candle: id == StrategyId::OpeningCandle,
            vwap_trend: id == StrategyId::VwapTrend,
            concretum_bands: id == StrategyId::ConcretumBands,
        }
    }
}
