pub mod config;
pub mod context;
pub mod executor;
pub mod feed;
pub mod journal;
pub mod lifecycle;
pub mod session;

pub use config::{EngineConfig, ExecutionConfig, FeedConfig, VolatilityConfig};
pub use context::EngineContext;
pub use executor::{realized_pnl, EntryRequest, OrderExecutor};
pub use feed::{BroadcastFeed, JsonLinesFeed};
pub use journal::{MemorySink, TracingSink};
pub use lifecycle::{Engine, EngineHandle};
pub use session::{SessionChange, SessionRange, SessionTracker};
