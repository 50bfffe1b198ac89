use chrono::{DateTime, Utc};
use tracing::info;

use common::{Error, Position, Result, RiskProfile, Side, Signal, StrategyId};

use crate::vwap_trend::vwap_stop_hit;
use crate::{MarketContext, Strategy, Timeframe};

/// Volatility envelope around the session open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub lower: f64,
}

impl Bands {
    pub fn new(session_open: f64, volatility_factor: f64) -> Self {
        Self {
            upper: session_open * (1.0 + volatility_factor),
            lower: session_open * (1.0 - volatility_factor),
        }
    }
}

/// Strategy 3: Concretum Bands breakout on 1-minute candles.
///
/// Enters when a candle closes through a band that the previous candle opened
/// inside of, confirmed by MA400. Exits on the VWAP trailing stop. Sized with
/// the boosted risk budget.
#[derive(Debug, Default)]
pub struct ConcretumBands {
    last_candle: Option<DateTime<Utc>>,
}

impl ConcretumBands {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for ConcretumBands {
    fn id(&self) -> StrategyId {
        StrategyId::ConcretumBands
    }

    fn risk_profile(&self) -> RiskProfile {
        RiskProfile::Boosted
    }

    fn evaluate(&mut self, ctx: &MarketContext<'_>, position: Option<&Position>) -> Result<Option<Signal>> {
        let ma400 = ctx
            .indicators
            .ma400
            .ok_or_else(|| Error::not_ready("MA400 warming up"))?;
        let (previous, current) = match (
            ctx.candles.previous(Timeframe::OneMinute),
            ctx.candles.latest(Timeframe::OneMinute),
        ) {
            (Some(p), Some(c)) => (p, c),
            _ => return Err(Error::not_ready("need two sealed 1m candles")),
        };

        if self.last_candle == Some(current.sealed_at) {
            return Ok(None);
        }

        if let Some(pos) = position {
            let vwap = ctx
                .indicators
                .vwap
                .filter(|v| *v > 0.0)
                .ok_or_else(|| Error::not_ready("VWAP unavailable"))?;
            self.last_candle = Some(current.sealed_at);
            if vwap_stop_hit(pos.side, current.close, vwap) {
                info!(strategy = %self.id(), side = %pos.side, close = current.close, vwap, "VWAP trailing stop hit");
                return Ok(Some(Signal::Exit));
            }
            return Ok(None);
        }

        let session_open = ctx
            .session_open
            .ok_or_else(|| Error::not_ready("session open price not captured"))?;
        let factor = ctx
            .volatility_factor
            .ok_or_else(|| Error::not_ready("no volatility history"))?;
        let bands = Bands::new(session_open, factor);
        self.last_candle = Some(current.sealed_at);

        let signal = if previous.open < bands.upper && current.close > bands.upper && current.close > ma400 {
            Some(Signal::Enter(Side::Long))
        } else if previous.open > bands.lower && current.close < bands.lower && current.close < ma400 {
            Some(Signal::Enter(Side::Short))
        } else {
            None
        };
        if let Some(s) = signal {
            info!(
                strategy = %self.id(),
                upper = bands.upper,
                lower = bands.lower,
                close = current.close,
                ma400,
                signal = ?s,
                "Band breakout"
            );
        }
        Ok(signal)
    }
}
