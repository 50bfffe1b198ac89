pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod settings;
pub mod sink;
pub mod types;

pub use broker::Broker;
pub use clock::{Clock, ManualClock, MarketHours, SessionConfig, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use feed::MarketDataFeed;
pub use settings::{InstrumentConfig, RiskSettings, RiskTier};
pub use sink::TradeSink;
pub use types::*;
