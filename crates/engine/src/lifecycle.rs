use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use common::{
    Broker, Clock, EngineCommand, EngineState, EngineStatus, Error, MarketDataFeed, Result, RiskSettings, StrategyId,
    TradeSink,
};

use crate::config::EngineConfig;
use crate::context::EngineContext;

/// Cloneable handle for controllers (CLI, tests, embedders).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Other("engine is not running".into()))
    }

    pub async fn start(&self) -> Result<()> {
        self.send(EngineCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(EngineCommand::Stop).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(EngineCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(EngineCommand::Resume).await
    }

    pub async fn close_all(&self) -> Result<()> {
        self.send(EngineCommand::CloseAll).await
    }

    pub async fn close_position(&self, strategy: StrategyId) -> Result<()> {
        self.send(EngineCommand::ClosePosition(strategy)).await
    }

    /// Takes effect from the next evaluation cycle. Invalid settings are
    /// rejected and the current ones kept.
    pub async fn update_risk_settings(&self, settings: RiskSettings) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::UpdateRiskSettings { settings, reply }).await?;
        rx.await.map_err(|_| Error::Other("engine dropped the reply".into()))?
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status(reply)).await?;
        rx.await.map_err(|_| Error::Other("engine dropped the reply".into()))
    }

    /// Last published engine state, without a round trip.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// The main engine: owns the `EngineContext` and serialises market events,
/// controller commands and watchdog ticks onto one task.
pub struct Engine {
    ctx: EngineContext,
    feed: Arc<dyn MarketDataFeed>,
    command_rx: mpsc::Receiver<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    watchdog_interval: Duration,
}

impl Engine {
    pub fn new(
        cfg: &EngineConfig,
        broker: Arc<dyn Broker>,
        feed: Arc<dyn MarketDataFeed>,
        sink: Arc<dyn TradeSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, EngineHandle)> {
        let ctx = EngineContext::new(cfg, broker, sink, clock)?;
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(ctx.state()));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
        };
        let engine = Engine {
            ctx,
            feed,
            command_rx,
            state,
            watchdog_interval: Duration::from_millis(cfg.feed.watchdog_interval_ms),
        };
        Ok((engine, handle))
    }

    /// Run the engine until every handle is dropped. Call from `tokio::spawn`.
    ///
    /// Market data is consumed from the moment the engine runs so indicators
    /// warm up; strategies are only evaluated after `Start`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        let mut events = self.feed.subscribe();
        let mut feed_open = true;
        let mut watchdog = tokio::time::interval(self.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },

                event = events.next(), if feed_open => match event {
                    Some(event) => self.ctx.on_event(event).await,
                    None => {
                        feed_open = false;
                        self.ctx.feed_closed();
                    }
                },

                _ = watchdog.tick() => self.ctx.on_tick().await,
            }
            self.publish_state().await;
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Start => {
                if self.ctx.state() == EngineState::Running {
                    info!("Engine already running");
                    return;
                }
                self.ctx.start().await;
            }
            EngineCommand::Stop => self.ctx.stop(),
            EngineCommand::Pause => self.ctx.pause(),
            EngineCommand::Resume => self.ctx.resume(),
            EngineCommand::CloseAll => self.ctx.close_all().await,
            EngineCommand::ClosePosition(id) => self.ctx.close_strategy(id).await,
            EngineCommand::UpdateRiskSettings { settings, reply } => {
                let _ = reply.send(self.ctx.update_risk_settings(settings));
            }
            EngineCommand::Status(reply) => {
                let _ = reply.send(self.ctx.status());
            }
        }
    }

    async fn publish_state(&self) {
        let current = self.ctx.state();
        let mut published = self.state.write().await;
        if *published != current {
            *published = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SystemClock;
    use paper::PaperBroker;

    use crate::feed::BroadcastFeed;
    use crate::journal::MemorySink;

    fn spawn_engine() -> EngineHandle {
        let (engine, handle) = Engine::new(
            &EngineConfig::default(),
            Arc::new(PaperBroker::new(0.0)),
            Arc::new(BroadcastFeed::new(16)),
            Arc::new(MemorySink::new()),
            Arc::new(SystemClock),
        )
        .unwrap();
        tokio::spawn(engine.run());
        handle
    }

    #[tokio::test]
    async fn commands_drive_engine_state() {
        let handle = spawn_engine();
        assert_eq!(handle.status().await.unwrap().state, EngineState::Stopped);

        handle.start().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.running);
        assert!(status.trading_enabled);
        assert_eq!(handle.state().await, EngineState::Running);

        handle.pause().await.unwrap();
        assert_eq!(handle.status().await.unwrap().state, EngineState::Paused);

        handle.resume().await.unwrap();
        assert_eq!(handle.status().await.unwrap().state, EngineState::Running);

        handle.stop().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(!status.running);
        assert_eq!(handle.state().await, EngineState::Stopped);
    }

    #[tokio::test]
    async fn invalid_risk_settings_are_rejected() {
        let handle = spawn_engine();
        let bad = RiskSettings {
            daily_loss_limit: -1.0,
            ..RiskSettings::default()
        };
        assert!(matches!(handle.update_risk_settings(bad).await, Err(Error::Config(_))));

        let good = RiskSettings {
            max_risk_per_trade: 150.0,
            ..RiskSettings::default()
        };
        assert!(handle.update_risk_settings(good).await.is_ok());
    }

    #[tokio::test]
    async fn status_lists_enabled_strategies_flat() {
        let handle = spawn_engine();
        let status = handle.status().await.unwrap();
        assert_eq!(status.strategies.len(), 3);
        assert!(status.positions.is_empty());
        assert_eq!(status.daily_pnl, 0.0);
    }
}
