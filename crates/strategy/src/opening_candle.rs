use chrono::NaiveDate;
use tracing::{debug, info};

use common::{Error, Position, Result, Side, Signal, StrategyId};

use crate::{MarketContext, Strategy, Timeframe};

/// Strategy 1: trade the direction of the first 5-minute candle.
///
/// Evaluated once per session, inside the one-minute trigger window that
/// opens when the opening candle seals. A bullish candle closing above MA350
/// goes long; a bearish candle closing below it goes short. There is no
/// signal exit; the position is flattened by the pre-close rule.
#[derive(Debug, Default)]
pub struct OpeningCandle {
    evaluated_on: Option<NaiveDate>,
}

impl OpeningCandle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for OpeningCandle {
    fn id(&self) -> StrategyId {
        StrategyId::OpeningCandle
    }

    fn evaluate(&mut self, ctx: &MarketContext<'_>, position: Option<&Position>) -> Result<Option<Signal>> {
        let ma350 = ctx
            .indicators
            .ma350
            .ok_or_else(|| Error::not_ready("MA350 warming up"))?;

        if position.is_some() || !ctx.hours.in_opening_trigger(ctx.now) {
            return Ok(None);
        }
        let today = ctx.hours.session_date(ctx.now);
        if self.evaluated_on == Some(today) {
            return Ok(None);
        }

        let trigger_start = ctx
            .hours
            .opening_trigger(today)
            .map(|(start, _)| start)
            .ok_or_else(|| Error::not_ready("no session today"))?;
        let candle = ctx
            .candles
            .latest(Timeframe::FiveMinutes)
            .filter(|c| c.sealed_at == trigger_start)
            .ok_or_else(|| Error::not_ready("opening 5m candle not sealed"))?;

        self.evaluated_on = Some(today);

        let signal = if candle.close > candle.open && candle.close > ma350 {
            Some(Signal::Enter(Side::Long))
        } else if candle.close < candle.open && candle.close < ma350 {
            Some(Signal::Enter(Side::Short))
        } else {
            None
        };

        match signal {
            Some(s) => info!(strategy = %self.id(), open = candle.open, close = candle.close, ma350, signal = ?s, "Opening candle signal"),
            None => debug!(strategy = %self.id(), open = candle.open, close = candle.close, ma350, "Opening candle gave no direction"),
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{aggregator, et, hours, position};
    use crate::CandleAggregator;
    use common::{IndicatorSnapshot, MarketHours};

    /// Opening candle 09:30–09:35 with the given open and close.
    fn opening_candle(open: f64, close: f64) -> CandleAggregator {
        let mut agg = aggregator();
        agg.push(open, 1.0, et(9, 30, 0));
        agg.push((open + close) / 2.0, 1.0, et(9, 32, 0));
        agg.push(close, 1.0, et(9, 34, 59));
        agg.push(close, 1.0, et(9, 35, 0));
        agg
    }

    fn ctx<'a>(
        now: chrono::DateTime<chrono::Utc>,
        hours: &'a MarketHours,
        candles: &'a CandleAggregator,
        ma350: Option<f64>,
    ) -> MarketContext<'a> {
        MarketContext {
            now,
            hours,
            candles,
            indicators: IndicatorSnapshot {
                ma350,
                ..IndicatorSnapshot::default()
            },
            volatility_factor: None,
            session_open: None,
        }
    }

    #[test]
    fn bullish_opening_candle_above_ma_goes_long_once() {
        let h = hours();
        let candles = opening_candle(95.0, 100.0);
        let mut s = OpeningCandle::new();

        let signal = s.evaluate(&ctx(et(9, 35, 10), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(signal, Some(Signal::Enter(Side::Long)));

        // Same window, same candle: evaluated once
        let again = s.evaluate(&ctx(et(9, 35, 40), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(again, None);
    }

    #[test]
    fn no_signal_one_minute_before_or_after_trigger() {
        let h = hours();
        let candles = opening_candle(95.0, 100.0);

        let mut early = OpeningCandle::new();
        let res = early.evaluate(&ctx(et(9, 34, 10), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(res, None);

        let mut late = OpeningCandle::new();
        let res = late.evaluate(&ctx(et(9, 36, 10), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(res, None);
    }

    #[test]
    fn bearish_opening_candle_below_ma_goes_short() {
        let h = hours();
        let candles = opening_candle(100.0, 95.0);
        let mut s = OpeningCandle::new();
        let signal = s.evaluate(&ctx(et(9, 35, 5), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(signal, Some(Signal::Enter(Side::Short)));
    }

    #[test]
    fn bullish_candle_below_ma_does_nothing() {
        let h = hours();
        let candles = opening_candle(95.0, 100.0);
        let mut s = OpeningCandle::new();
        let signal = s.evaluate(&ctx(et(9, 35, 5), &h, &candles, Some(101.0)), None).unwrap();
        assert_eq!(signal, None);
    }

    #[test]
    fn not_ready_without_ma350() {
        let h = hours();
        let candles = opening_candle(95.0, 100.0);
        let mut s = OpeningCandle::new();
        let res = s.evaluate(&ctx(et(9, 35, 5), &h, &candles, None), None);
        assert!(matches!(res, Err(Error::DataNotReady(_))));

        // Once the average is ready the window can still be used
        let signal = s.evaluate(&ctx(et(9, 35, 30), &h, &candles, Some(98.0)), None).unwrap();
        assert_eq!(signal, Some(Signal::Enter(Side::Long)));
    }

    #[test]
    fn skips_when_position_already_open() {
        let h = hours();
        let candles = opening_candle(95.0, 100.0);
        let mut s = OpeningCandle::new();
        let pos = position(StrategyId::OpeningCandle, Side::Long);
        let signal = s.evaluate(&ctx(et(9, 35, 5), &h, &candles, Some(98.0)), Some(&pos)).unwrap();
        assert_eq!(signal, None);
    }
}
