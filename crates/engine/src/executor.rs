use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use common::{Broker, Error, Fill, Order, Position, Result, Side, StrategyId, TradeLogEntry, TradeSink};
use risk::PositionTracker;

use crate::config::ExecutionConfig;

/// Realized P&L of closing `position` at `exit_price`.
pub fn realized_pnl(position: &Position, exit_price: f64, contract_multiplier: f64) -> f64 {
    let per_point = (exit_price - position.entry_price) * position.quantity as f64 * contract_multiplier;
    match position.side {
        Side::Long => per_point,
        Side::Short => -per_point,
    }
}

/// An entry that has passed every risk gate.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRequest {
    pub strategy: StrategyId,
    pub side: Side,
    pub quantity: u32,
    pub mark_price: f64,
    /// Capital approved by the allocation check. This, not the fill
    /// notional, is what the tracker commits.
    pub notional: f64,
    /// Market time the entry was decided at.
    pub time: DateTime<Utc>,
}

/// Turns approved intents into broker orders with bounded retry.
///
/// This is the ONLY component that calls `Broker::place_order`. It records
/// confirmed fills in the `PositionTracker` and the trade log; nothing is
/// recorded for an order that never filled.
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    cfg: ExecutionConfig,
    symbol: String,
    contract_multiplier: f64,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>, cfg: ExecutionConfig, symbol: impl Into<String>, contract_multiplier: f64) -> Self {
        Self {
            broker,
            cfg,
            symbol: symbol.into(),
            contract_multiplier,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Submit `order` up to `max_retries` times. Each attempt is bounded by
    /// the attempt timeout; a timed-out attempt is cancelled before the next
    /// one. Every retry reuses the same order id.
    pub async fn place_with_retry(&self, order: &Order) -> Result<Fill> {
        let max = self.cfg.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max {
            match tokio::time::timeout(self.cfg.attempt_timeout(), self.broker.place_order(order)).await {
                Ok(Ok(fill)) => {
                    info!(
                        order_id = %order.id,
                        strategy = %order.strategy,
                        side = %order.side,
                        price = fill.fill_price,
                        qty = fill.quantity,
                        attempt,
                        "Order filled"
                    );
                    return Ok(fill);
                }
                Ok(Err(e)) => {
                    warn!(order_id = %order.id, strategy = %order.strategy, attempt, max, error = %e, "Order attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(
                        order_id = %order.id,
                        strategy = %order.strategy,
                        attempt,
                        max,
                        timeout_ms = self.cfg.attempt_timeout_ms,
                        "Order attempt timed out, cancelling"
                    );
                    last_error = format!("attempt timed out after {}ms", self.cfg.attempt_timeout_ms);
                    if let Err(e) = self.broker.cancel_order(&order.id).await {
                        warn!(order_id = %order.id, error = %e, "Cancel after timeout failed");
                    }
                }
            }
            if attempt < max {
                tokio::time::sleep(self.cfg.retry_delay()).await;
            }
        }

        error!(order_id = %order.id, strategy = %order.strategy, attempts = max, error = %last_error, "Order abandoned after retries");
        Err(Error::OrderFailed {
            attempts: max,
            last_error,
        })
    }

    /// Open the position described by `req`. On fill, the position is
    /// recorded in the tracker with the approved notional and an OPEN entry
    /// is written to the trade log.
    pub async fn open_position(
        &self,
        tracker: &mut PositionTracker,
        sink: &dyn TradeSink,
        req: &EntryRequest,
    ) -> Result<Position> {
        let order = Order::market(&self.symbol, req.side.entry_order(), req.quantity, req.mark_price, req.strategy)
            .at(req.time);
        info!(
            order_id = %order.id,
            strategy = %req.strategy,
            side = %req.side,
            qty = req.quantity,
            mark = req.mark_price,
            "Opening position"
        );
        let fill = self.place_with_retry(&order).await?;

        let position = Position {
            strategy: req.strategy,
            side: req.side,
            quantity: fill.quantity,
            entry_price: fill.fill_price,
            entry_time: fill.timestamp,
        };
        tracker.record_entry(position.clone(), req.notional)?;
        sink.record_trade(&TradeLogEntry::opened(&position));
        Ok(position)
    }

    /// Close the open position of `strategy` with an opposite-side order.
    /// Returns the closed position and its realized P&L.
    pub async fn close_position(
        &self,
        tracker: &mut PositionTracker,
        sink: &dyn TradeSink,
        strategy: StrategyId,
        mark_price: f64,
        time: DateTime<Utc>,
    ) -> Result<(Position, f64)> {
        let position = tracker
            .position(strategy)
            .cloned()
            .ok_or_else(|| Error::Other(format!("{strategy} has no open position to close")))?;

        let order = Order::market(
            &self.symbol,
            position.side.exit_order(),
            position.quantity,
            mark_price,
            strategy,
        )
        .at(time);
        info!(order_id = %order.id, strategy = %strategy, side = %position.side, qty = position.quantity, "Closing position");
        let fill = self.place_with_retry(&order).await?;

        let pnl = realized_pnl(&position, fill.fill_price, self.contract_multiplier);
        tracker.record_exit(strategy);
        sink.record_trade(&TradeLogEntry::closed(&position, &fill, pnl));
        info!(strategy = %strategy, entry = position.entry_price, exit = fill.fill_price, pnl, "Position closed");
        Ok((position, pnl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::TradeAction;
    use paper::PaperBroker;

    use crate::journal::MemorySink;

    fn fast() -> ExecutionConfig {
        ExecutionConfig {
            max_retries: 3,
            retry_delay_ms: 1,
            attempt_timeout_ms: 1_000,
            ..ExecutionConfig::default()
        }
    }

    fn entry(strategy: StrategyId, side: Side, quantity: u32, mark_price: f64) -> EntryRequest {
        EntryRequest {
            strategy,
            side,
            quantity,
            mark_price,
            notional: mark_price * quantity as f64 * 2.0,
            time: Utc::now(),
        }
    }

    fn executor(broker: Arc<PaperBroker>, cfg: ExecutionConfig) -> OrderExecutor {
        OrderExecutor::new(broker, cfg, "MNQ", 2.0)
    }

    fn long(entry: f64, qty: u32) -> Position {
        Position {
            strategy: StrategyId::VwapTrend,
            side: Side::Long,
            quantity: qty,
            entry_price: entry,
            entry_time: Utc::now(),
        }
    }

    #[test]
    fn pnl_sign_follows_side() {
        let pos = long(16_000.0, 2);
        assert_eq!(realized_pnl(&pos, 16_010.0, 2.0), 40.0);

        let short = Position { side: Side::Short, ..pos };
        assert_eq!(realized_pnl(&short, 16_010.0, 2.0), -40.0);
    }

    #[tokio::test]
    async fn open_then_close_records_trades_and_tracker() {
        let broker = Arc::new(PaperBroker::new(0.0));
        let exec = executor(broker, fast());
        let mut tracker = PositionTracker::default();
        let sink = MemorySink::new();

        let pos = exec
            .open_position(&mut tracker, &sink, &entry(StrategyId::VwapTrend, Side::Long, 1, 16_000.0))
            .await
            .unwrap();
        assert_eq!(pos.entry_price, 16_000.0);
        assert_eq!(tracker.open_count(), 1);
        assert_eq!(tracker.capital_used(StrategyId::VwapTrend), 32_000.0);

        let (_, pnl) = exec
            .close_position(&mut tracker, &sink, StrategyId::VwapTrend, 16_005.0, Utc::now())
            .await
            .unwrap();
        assert_eq!(pnl, 10.0);
        assert_eq!(tracker.open_count(), 0);

        let trades = sink.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].action, TradeAction::Open);
        assert_eq!(trades[1].action, TradeAction::Close);
        assert_eq!(trades[1].realized_pnl, 10.0);
    }

    #[tokio::test]
    async fn slipped_fill_commits_the_approved_notional() {
        let broker = Arc::new(PaperBroker::new(10.0));
        let exec = executor(broker, fast());
        let mut tracker = PositionTracker::default();
        let sink = MemorySink::new();

        let req = entry(StrategyId::OpeningCandle, Side::Long, 3, 100.0);
        let pos = exec.open_position(&mut tracker, &sink, &req).await.unwrap();
        assert!(pos.entry_price > 100.0);
        assert_eq!(pos.entry_time, req.time);
        assert_eq!(tracker.capital_used(StrategyId::OpeningCandle), 600.0);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let broker = Arc::new(PaperBroker::new(0.0));
        broker.fail_next(2);
        let exec = executor(broker.clone(), fast());

        let order = Order::market("MNQ", common::OrderSide::Buy, 1, 100.0, StrategyId::VwapTrend);
        assert!(exec.place_with_retry(&order).await.is_ok());
        assert_eq!(broker.orders_placed(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fabricate_nothing() {
        let broker = Arc::new(PaperBroker::new(0.0));
        broker.fail_next(3);
        let exec = executor(broker.clone(), fast());
        let mut tracker = PositionTracker::default();
        let sink = MemorySink::new();

        let res = exec
            .open_position(&mut tracker, &sink, &entry(StrategyId::ConcretumBands, Side::Short, 1, 100.0))
            .await;
        assert!(matches!(res, Err(Error::OrderFailed { attempts: 3, .. })));
        assert_eq!(tracker.open_count(), 0);
        assert!(sink.trades().is_empty());
        assert!(broker.positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timed_out_attempts_are_cancelled_with_same_order_id() {
        let broker = Arc::new(PaperBroker::new(0.0).with_latency(Duration::from_millis(200)));
        let cfg = ExecutionConfig {
            max_retries: 2,
            retry_delay_ms: 1,
            attempt_timeout_ms: 10,
            ..ExecutionConfig::default()
        };
        let exec = executor(broker.clone(), cfg);

        let order = Order::market("MNQ", common::OrderSide::Buy, 1, 100.0, StrategyId::VwapTrend);
        let res = exec.place_with_retry(&order).await;
        assert!(matches!(res, Err(Error::OrderFailed { attempts: 2, .. })));
        assert_eq!(broker.cancelled_orders().await, vec![order.id.clone(), order.id.clone()]);
    }

    #[tokio::test]
    async fn closing_without_position_is_an_error() {
        let exec = executor(Arc::new(PaperBroker::new(0.0)), fast());
        let mut tracker = PositionTracker::default();
        let sink = MemorySink::new();
        assert!(exec
            .close_position(&mut tracker, &sink, StrategyId::OpeningCandle, 100.0, Utc::now())
            .await
            .is_err());
    }
}
