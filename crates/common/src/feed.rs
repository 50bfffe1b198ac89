use futures_util::stream::BoxStream;

use crate::MarketEvent;

/// Source of price/quote events.
///
/// Each call to `subscribe` yields a fresh lazy stream. The stream ending is
/// treated by the engine as a loss of market data.
pub trait MarketDataFeed: Send + Sync {
    fn subscribe(&self) -> BoxStream<'static, MarketEvent>;
}
