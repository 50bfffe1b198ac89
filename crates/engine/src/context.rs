use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use common::{
    Broker, Clock, EngineEvent, EngineState, EngineStatus, Error, MarketEvent, MarketHours, Position,
    RejectionReason, Result, RiskSettings, Side, Signal, StrategyId, StrategyState, TradeAction, TradeSink,
};
use risk::{LimitBreach, PositionTracker, RiskGovernor};
use strategy::{CandleAggregator, IndicatorBank, MarketContext, StrategyRegistry, VolatilityEstimator};

use crate::config::EngineConfig;
use crate::executor::{EntryRequest, OrderExecutor};
use crate::session::SessionTracker;

/// All mutable engine state, owned by a single consumer.
///
/// Every market event is processed to completion: candles and indicators are
/// updated first, then each enabled strategy is evaluated in turn, and any
/// resulting order runs through the executor before the next strategy.
pub struct EngineContext {
    hours: MarketHours,
    symbol: String,
    stale_after: Duration,
    /// Zero disables periodic broker reconciliation.
    reconcile_every: Duration,

    candles: CandleAggregator,
    indicators: IndicatorBank,
    volatility: VolatilityEstimator,
    session: SessionTracker,

    strategies: StrategyRegistry,
    states: BTreeMap<StrategyId, StrategyState>,

    governor: RiskGovernor,
    tracker: PositionTracker,
    executor: OrderExecutor,

    sink: Arc<dyn TradeSink>,
    clock: Arc<dyn Clock>,

    state: EngineState,
    trading_enabled: bool,
    connected: bool,
    last_price: Option<f64>,
    /// Timestamp carried by the last market event.
    last_event_time: Option<DateTime<Utc>>,
    /// Receipt time of the last market event, by `clock`.
    last_received: Option<DateTime<Utc>>,
    last_reconciled: Option<DateTime<Utc>>,
}

impl EngineContext {
    pub fn new(cfg: &EngineConfig, broker: Arc<dyn Broker>, sink: Arc<dyn TradeSink>, clock: Arc<dyn Clock>) -> Result<Self> {
        cfg.validate()?;
        let hours = MarketHours::new(&cfg.session)?;
        let governor = RiskGovernor::new(cfg.risk.clone(), cfg.limits.clone(), cfg.instrument.clone())?;
        let strategies = StrategyRegistry::from_config(&cfg.strategies);
        let states = strategies.ids().into_iter().map(|id| (id, StrategyState::Flat)).collect();
        let executor = OrderExecutor::new(
            broker,
            cfg.execution.clone(),
            cfg.instrument.symbol.clone(),
            cfg.instrument.contract_multiplier,
        );

        Ok(Self {
            hours,
            symbol: cfg.instrument.symbol.clone(),
            stale_after: Duration::seconds(cfg.feed.stale_after_secs as i64),
            reconcile_every: Duration::seconds(cfg.execution.reconcile_interval_secs as i64),
            candles: CandleAggregator::new(&cfg.candles),
            indicators: IndicatorBank::new(&cfg.indicators),
            volatility: VolatilityEstimator::seeded(&cfg.volatility.history),
            session: SessionTracker::new(),
            strategies,
            states,
            governor,
            tracker: PositionTracker::new(cfg.limits.max_open_positions),
            executor,
            sink,
            clock,
            state: EngineState::Stopped,
            trading_enabled: false,
            connected: true,
            last_price: None,
            last_event_time: None,
            last_received: None,
            last_reconciled: None,
        })
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Begin evaluating strategies. Re-enables trading and reconciles the
    /// tracker with the broker.
    pub async fn start(&mut self) {
        self.state = if self.governor.halted() {
            EngineState::Halted
        } else {
            EngineState::Running
        };
        self.trading_enabled = true;
        self.last_received = Some(self.clock.now());
        info!(state = %self.state, "Engine started");
        self.reconcile().await;
    }

    /// Stop evaluating strategies. Open positions are left in place.
    pub fn stop(&mut self) {
        self.state = EngineState::Stopped;
        self.trading_enabled = false;
        info!(open_positions = self.tracker.open_count(), "Engine stopped");
    }

    pub fn pause(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Paused;
            info!("Engine paused, signals suppressed");
        }
    }

    /// Leave `Paused` and re-enable trading after a connectivity loss.
    pub fn resume(&mut self) {
        if self.state == EngineState::Paused {
            self.state = EngineState::Running;
        }
        if self.state != EngineState::Stopped && !self.trading_enabled {
            self.trading_enabled = true;
            self.last_received = Some(self.clock.now());
        }
        info!(state = %self.state, trading_enabled = self.trading_enabled, "Engine resumed");
    }

    pub fn update_risk_settings(&mut self, settings: RiskSettings) -> Result<()> {
        self.governor.update_settings(settings)
    }

    // ─── Market data ──────────────────────────────────────────────────────

    /// Process one market event to completion.
    pub async fn on_event(&mut self, event: MarketEvent) {
        if event.symbol != self.symbol {
            debug!(symbol = %event.symbol, "Ignoring event for other symbol");
            return;
        }
        if !event.is_valid() {
            warn!(price = event.price, "Dropping invalid market event");
            return;
        }

        self.last_received = Some(self.clock.now());
        if !self.connected {
            self.connected = true;
            info!("Market data flowing again; trading stays disabled until resumed");
            self.emit(EngineEvent::ConnectivityRestored);
        }

        let now = event.timestamp;
        self.candles.push(event.price, event.volume.unwrap_or(0.0), now);
        self.indicators.update(event.price, event.volume);
        self.last_price = Some(event.price);
        self.last_event_time = Some(now);

        if self.hours.is_open(now) {
            self.track_session(now, event.price);
        }

        self.run_cycle(now).await;
    }

    fn track_session(&mut self, now: DateTime<Utc>, price: f64) {
        let date = self.hours.session_date(now);
        let Some(change) = self.session.observe(date, price) else {
            return;
        };
        if let Some(prev) = change.previous {
            self.volatility.record_session(prev.open, prev.high, prev.low);
            debug!(date = %prev.date, factor = ?self.volatility.volatility_factor(), "Session range recorded");
        }
        self.governor.start_session();
        info!(date = %change.date, open_price = change.open_price, "New session");
        self.emit(EngineEvent::SessionStarted {
            date: change.date,
            open_price: change.open_price,
        });
    }

    /// The market data stream ended.
    pub fn feed_closed(&mut self) {
        self.lose_connectivity("market data feed ended".into());
    }

    /// Watchdog tick. Detects a stale feed, reconciles with the broker on
    /// its interval and, while data is missing, keeps driving pre-close exits
    /// and exit retries on wall-clock time. Exits are driven even when
    /// stopped.
    pub async fn on_tick(&mut self) {
        let now = self.clock.now();
        if self.state != EngineState::Stopped {
            if self.connected {
                if let Some(last) = self.last_received {
                    if now - last > self.stale_after {
                        self.lose_connectivity(format!(
                            "no market data for {}s",
                            (now - last).num_seconds()
                        ));
                    }
                }
            }
            if self.reconcile_due(now) {
                self.reconcile().await;
            }
        }
        if !self.connected {
            self.manage_exits(now).await;
        }
    }

    fn reconcile_due(&self, now: DateTime<Utc>) -> bool {
        if self.reconcile_every <= Duration::zero() {
            return false;
        }
        match self.last_reconciled {
            Some(last) => now - last >= self.reconcile_every,
            None => true,
        }
    }

    fn lose_connectivity(&mut self, reason: String) {
        if !self.connected && !self.trading_enabled {
            return;
        }
        self.connected = false;
        self.trading_enabled = false;
        warn!(reason = %reason, open_positions = self.tracker.open_count(), "Connectivity lost, trading disabled");
        self.emit(EngineEvent::ConnectivityLost { reason });
    }

    // ─── Evaluation cycle ─────────────────────────────────────────────────

    async fn run_cycle(&mut self, now: DateTime<Utc>) {
        self.manage_exits(now).await;

        if matches!(self.state, EngineState::Stopped | EngineState::Paused)
            || !self.hours.is_open(now)
            || self.hours.in_pre_close_window(now)
        {
            return;
        }

        for id in self.strategies.ids() {
            let position = self.tracker.position(id).cloned();
            let result = {
                let ctx = MarketContext {
                    now,
                    hours: &self.hours,
                    candles: &self.candles,
                    indicators: self.indicators.snapshot(),
                    volatility_factor: self.volatility.volatility_factor(),
                    session_open: self.session.open_price(),
                };
                match self.strategies.get_mut(id) {
                    Some(strategy) => strategy.evaluate(&ctx, position.as_ref()),
                    None => continue,
                }
            };

            let exiting = self.strategy_state(id) == StrategyState::Exiting;
            match result {
                Ok(Some(Signal::Enter(side))) if position.is_none() => self.try_enter(id, side, now).await,
                // Retried by manage_exits
                Ok(Some(Signal::Exit)) if exiting => debug!(strategy = %id, "Exit already pending"),
                Ok(Some(Signal::Exit)) if position.is_some() => {
                    self.set_state(id, StrategyState::Exiting);
                    self.attempt_exit(id, now).await;
                }
                Ok(Some(signal)) => debug!(strategy = %id, signal = ?signal, "Signal does not apply to current position"),
                Ok(None) => {}
                Err(Error::DataNotReady(why)) => debug!(strategy = %id, reason = %why, "Skipping evaluation"),
                Err(e) => warn!(strategy = %id, error = %e, "Strategy evaluation failed"),
            }
        }
    }

    /// Pre-close forced exits and retries of earlier failed exits. Runs even
    /// when entries are blocked.
    async fn manage_exits(&mut self, now: DateTime<Utc>) {
        if self.hours.in_pre_close_window(now) {
            for id in self.held_strategies() {
                if self.strategy_state(id) == StrategyState::Open {
                    info!(strategy = %id, "Pre-close window, forcing exit");
                    self.set_state(id, StrategyState::Exiting);
                    self.emit(EngineEvent::ForcedExit { strategy: id });
                }
            }
        }
        let exiting: Vec<StrategyId> = self
            .held_strategies()
            .into_iter()
            .filter(|id| self.strategy_state(*id) == StrategyState::Exiting)
            .collect();
        for id in exiting {
            self.attempt_exit(id, now).await;
        }
    }

    async fn try_enter(&mut self, id: StrategyId, side: Side, now: DateTime<Utc>) {
        if let Err(reason) = self.entry_gate(id) {
            info!(strategy = %id, side = %side, reason = %reason, "Entry rejected");
            self.emit(EngineEvent::EntryRejected { strategy: id, reason });
            return;
        }
        let Some(price) = self.last_price else {
            return;
        };
        let profile = match self.strategies.get_mut(id) {
            Some(s) => s.risk_profile(),
            None => return,
        };

        let quantity = match self.governor.size_position(profile, price) {
            Ok(q) => q,
            Err(e) => {
                warn!(strategy = %id, error = %e, "Cannot size position");
                return;
            }
        };
        let notional = self.governor.notional(price, quantity);
        if let Err(reason) = self.governor.check_capital_allocation(&self.tracker, id, notional) {
            info!(strategy = %id, reason = %reason, "Entry rejected");
            self.emit(EngineEvent::EntryRejected { strategy: id, reason });
            return;
        }

        self.set_state(id, StrategyState::Entering);
        let req = EntryRequest {
            strategy: id,
            side,
            quantity,
            mark_price: price,
            notional,
            time: now,
        };
        let result = self
            .executor
            .open_position(&mut self.tracker, self.sink.as_ref(), &req)
            .await;
        match result {
            Ok(_) => self.set_state(id, StrategyState::Open),
            Err(e) => {
                self.set_state(id, StrategyState::Flat);
                self.order_failed(id, TradeAction::Open, e);
            }
        }
    }

    /// Every gate an entry must pass before sizing.
    fn entry_gate(&mut self, id: StrategyId) -> Result<(), RejectionReason> {
        if !self.trading_enabled {
            return Err(RejectionReason::TradingDisabled);
        }
        let now = self.last_event_time.unwrap_or_else(|| self.clock.now());
        if self.hours.in_pre_close_window(now) {
            return Err(RejectionReason::PreCloseWindow);
        }
        if let Err(reason) = self.governor.check_entry() {
            if matches!(reason, RejectionReason::TotalLossLimit { .. }) {
                self.halt();
            }
            return Err(reason);
        }
        if self.state != EngineState::Running {
            return Err(RejectionReason::TradingDisabled);
        }
        self.tracker.check_can_open(id)
    }

    async fn attempt_exit(&mut self, id: StrategyId, now: DateTime<Utc>) {
        let Some(price) = self.last_price else {
            warn!(strategy = %id, "No price to close at, exit deferred");
            return;
        };
        let result = self
            .executor
            .close_position(&mut self.tracker, self.sink.as_ref(), id, price, now)
            .await;
        match result {
            Ok((_, pnl)) => {
                self.set_state(id, StrategyState::Flat);
                for breach in self.governor.record_realized(pnl) {
                    match breach {
                        LimitBreach::Daily { daily_loss } => self.emit(EngineEvent::DailyLimitBreached { daily_loss }),
                        LimitBreach::Total { total_loss } => {
                            self.halt();
                            self.emit(EngineEvent::TotalLimitBreached { total_loss });
                        }
                    }
                }
            }
            Err(e) => {
                // Position stays open; retried next cycle
                self.set_state(id, StrategyState::Exiting);
                self.order_failed(id, TradeAction::Close, e);
            }
        }
    }

    fn order_failed(&self, id: StrategyId, action: TradeAction, e: Error) {
        let attempts = match &e {
            Error::OrderFailed { attempts, .. } => *attempts,
            _ => 0,
        };
        let error = match e {
            Error::OrderFailed { last_error, .. } => last_error,
            other => other.to_string(),
        };
        self.emit(EngineEvent::OrderFailed {
            strategy: id,
            action,
            attempts,
            error,
        });
    }

    fn halt(&mut self) {
        if matches!(self.state, EngineState::Running | EngineState::Paused) {
            warn!("Total loss limit reached, engine halted; exits continue");
            self.state = EngineState::Halted;
        }
    }

    // ─── Controller operations ────────────────────────────────────────────

    /// Flatten one strategy's position on request.
    pub async fn close_strategy(&mut self, id: StrategyId) {
        if self.tracker.position(id).is_none() {
            info!(strategy = %id, "Close requested but no position is open");
            return;
        }
        let now = self.last_event_time.unwrap_or_else(|| self.clock.now());
        self.set_state(id, StrategyState::Exiting);
        self.attempt_exit(id, now).await;
    }

    pub async fn close_all(&mut self) {
        for id in self.held_strategies() {
            self.close_strategy(id).await;
        }
    }

    /// Compare tracked positions with what the broker reports. Mismatches are
    /// reported, never corrected.
    pub async fn reconcile(&mut self) {
        self.last_reconciled = Some(self.clock.now());
        let broker_positions = match self.executor.broker().positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Broker position query failed");
                return;
            }
        };
        let broker_net: i64 = broker_positions
            .iter()
            .filter(|p| p.symbol == self.symbol)
            .map(|p| p.net_quantity)
            .sum();
        let tracked_net: i64 = self
            .tracker
            .positions()
            .map(|p| match p.side {
                Side::Long => p.quantity as i64,
                Side::Short => -(p.quantity as i64),
            })
            .sum();
        if broker_net == tracked_net {
            info!(symbol = %self.symbol, net = tracked_net, "Positions reconciled");
        } else {
            warn!(symbol = %self.symbol, broker_net, tracked_net, "Broker position differs from tracked positions");
            self.emit(EngineEvent::PositionMismatch { broker_net, tracked_net });
        }
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            running: self.state != EngineState::Stopped,
            trading_enabled: self.trading_enabled,
            positions: self.tracker.positions().cloned().collect(),
            strategies: self.states.iter().map(|(id, s)| (*id, *s)).collect(),
            daily_pnl: self.governor.daily_pnl(),
            total_pnl: self.governor.total_pnl(),
            indicators: self.indicators.snapshot(),
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn strategy_state(&self, id: StrategyId) -> StrategyState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    pub fn position(&self, id: StrategyId) -> Option<&Position> {
        self.tracker.position(id)
    }

    pub fn governor(&self) -> &RiskGovernor {
        &self.governor
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn candles(&self) -> &CandleAggregator {
        &self.candles
    }

    pub fn volatility_factor(&self) -> Option<f64> {
        self.volatility.volatility_factor()
    }

    fn held_strategies(&self) -> Vec<StrategyId> {
        self.tracker.positions().map(|p| p.strategy).collect()
    }

    fn set_state(&mut self, id: StrategyId, state: StrategyState) {
        let prev = self.states.insert(id, state).unwrap_or_default();
        if prev != state {
            debug!(strategy = %id, from = ?prev, to = ?state, "Strategy state");
        }
    }

    fn emit(&self, event: EngineEvent) {
        self.sink.record_event(&event);
    }
}
