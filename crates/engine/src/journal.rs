use std::sync::Mutex;

use tracing::{info, warn};

use common::{EngineEvent, TradeLogEntry, TradeSink};

/// Writes trades and engine events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TradeSink for TracingSink {
    fn record_trade(&self, entry: &TradeLogEntry) {
        info!(
            target: "trade_log",
            time = %entry.time,
            strategy = %entry.strategy,
            action = %entry.action,
            side = %entry.side,
            qty = entry.quantity,
            price = entry.price,
            realized_pnl = entry.realized_pnl,
            "Trade"
        );
    }

    fn record_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::SessionStarted { date, open_price } => {
                info!(target: "engine_events", date = %date, open_price, "Session started")
            }
            EngineEvent::ConnectivityRestored => info!(target: "engine_events", "Connectivity restored"),
            other => warn!(target: "engine_events", event = ?other, "Engine event"),
        }
    }
}

/// Keeps everything in memory. Used by tests and embedders that read the
/// journal back.
#[derive(Debug, Default)]
pub struct MemorySink {
    trades: Mutex<Vec<TradeLogEntry>>,
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<TradeLogEntry> {
        self.trades.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TradeSink for MemorySink {
    fn record_trade(&self, entry: &TradeLogEntry) {
        self.trades.lock().unwrap_or_else(|e| e.into_inner()).push(entry.clone());
    }

    fn record_event(&self, event: &EngineEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
    }
}
