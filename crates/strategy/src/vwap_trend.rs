use chrono::{DateTime, Utc};
use tracing::info;

use common::{Error, Position, Result, Side, Signal, StrategyId};

use crate::{MarketContext, Strategy, Timeframe};

/// VWAP trailing stop: a long closing below VWAP, or a short closing above
/// it, is flattened.
pub(crate) fn vwap_stop_hit(side: Side, close: f64, vwap: f64) -> bool {
    match side {
        Side::Long => close < vwap,
        Side::Short => close > vwap,
    }
}

/// Strategy 2: follow the 15-minute trend relative to VWAP and MA300.
///
/// Each sealed 15-minute candle is acted on once. With a position open only
/// the VWAP trailing stop is checked; when flat, a close above both VWAP and
/// MA300 goes long and a close below both goes short.
#[derive(Debug, Default)]
pub struct VwapTrend {
    last_candle: Option<DateTime<Utc>>,
}

impl VwapTrend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for VwapTrend {
    fn id(&self) -> StrategyId {
        StrategyId::VwapTrend
    }

    fn evaluate(&mut self, ctx: &MarketContext<'_>, position: Option<&Position>) -> Result<Option<Signal>> {
        let ma300 = ctx
            .indicators
            .ma300
            .ok_or_else(|| Error::not_ready("MA300 warming up"))?;
        let vwap = ctx
            .indicators
            .vwap
            .filter(|v| *v > 0.0)
            .ok_or_else(|| Error::not_ready("VWAP unavailable"))?;
        let candle = ctx
            .candles
            .latest(Timeframe::FifteenMinutes)
            .ok_or_else(|| Error::not_ready("no sealed 15m candle"))?;

        if self.last_candle == Some(candle.sealed_at) {
            return Ok(None);
        }
        self.last_candle = Some(candle.sealed_at);

        if let Some(pos) = position {
            if vwap_stop_hit(pos.side, candle.close, vwap) {
                info!(strategy = %self.id(), side = %pos.side, close = candle.close, vwap, "VWAP trailing stop hit");
                return Ok(Some(Signal::Exit));
            }
            return Ok(None);
        }

        let signal = if candle.close > vwap && candle.close > ma300 {
            Some(Signal::Enter(Side::Long))
        } else if candle.close < vwap && candle.close < ma300 {
            Some(Signal::Enter(Side::Short))
        } else {
            None
        };
        if let Some(s) = signal {
            info!(strategy = %self.id(), close = candle.close, vwap, ma300, signal = ?s, "VWAP trend signal");
        }
        Ok(signal)
    }
}
