use crate::{EngineEvent, TradeLogEntry};

/// Receives the trade journal and engine diagnostics.
///
/// Called from the engine's consumer task, so implementations must not block.
pub trait TradeSink: Send + Sync {
    fn record_trade(&self, entry: &TradeLogEntry);

    fn record_event(&self, event: &EngineEvent);
}
