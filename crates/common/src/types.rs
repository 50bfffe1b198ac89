use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{Result, RiskSettings};

/// Price/quote update from the market-data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: String,
    pub price: f64,
    /// Traded volume since the previous event, when the feed reports it.
    #[serde(default)]
    pub volume: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl MarketEvent {
    pub fn new(symbol: impl Into<String>, price: f64, volume: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    /// Non-positive or non-finite prices (and negative volumes) are malformed.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.volume.map_or(true, |v| v.is_finite() && v >= 0.0)
    }
}

/// Side of an order sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of a held position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a position in this direction.
    pub fn entry_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position in this direction.
    pub fn exit_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// The three rule sets run by the engine, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    OpeningCandle,
    VwapTrend,
    ConcretumBands,
}

impl StrategyId {
    pub const ALL: [StrategyId; 3] = [
        StrategyId::OpeningCandle,
        StrategyId::VwapTrend,
        StrategyId::ConcretumBands,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyId::OpeningCandle => "opening_candle",
            StrategyId::VwapTrend => "vwap_trend",
            StrategyId::ConcretumBands => "concretum_bands",
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        StrategyId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::Error::Config(format!("unknown strategy '{s}'")))
    }
}

/// Which risk budget a strategy sizes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    #[default]
    Base,
    /// Scaled-up risk amount, capped at an absolute ceiling.
    Boosted,
}

/// An order to be submitted to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    /// Last traded price seen by the engine when the order was created.
    /// Live brokers ignore it; simulators fill against it.
    pub mark_price: f64,
    pub strategy: StrategyId,
    /// Market time the order was raised at. Simulated fills are stamped with it.
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        mark_price: f64,
        strategy: StrategyId,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            mark_price,
            strategy,
            created_at: Utc::now(),
        }
    }

    /// Stamp the order with the market time it was raised at.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.created_at = time;
        self
    }
}

/// Confirmation of a filled order returned by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

/// Net position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    /// Positive = long contracts, negative = short contracts.
    pub net_quantity: i64,
    pub average_price: f64,
}

/// Intent emitted by a strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Enter(Side),
    Exit,
}

/// A position opened by one strategy. At most one exists per strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub strategy: StrategyId,
    pub side: Side,
    pub quantity: u32,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
}

/// Per-strategy lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyState {
    #[default]
    Flat,
    /// Entry order submitted, awaiting the broker.
    Entering,
    Open,
    /// Close order submitted or awaiting retry.
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Open,
    Close,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Open => write!(f, "OPEN"),
            TradeAction::Close => write!(f, "CLOSE"),
        }
    }
}

/// Append-only trade journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub time: DateTime<Utc>,
    pub strategy: StrategyId,
    pub action: TradeAction,
    pub side: Side,
    pub quantity: u32,
    pub price: f64,
    pub realized_pnl: f64,
}

impl TradeLogEntry {
    pub fn opened(position: &Position) -> Self {
        Self {
            time: position.entry_time,
            strategy: position.strategy,
            action: TradeAction::Open,
            side: position.side,
            quantity: position.quantity,
            price: position.entry_price,
            realized_pnl: 0.0,
        }
    }

    pub fn closed(position: &Position, fill: &Fill, realized_pnl: f64) -> Self {
        Self {
            time: fill.timestamp,
            strategy: position.strategy,
            action: TradeAction::Close,
            side: position.side,
            quantity: position.quantity,
            price: fill.fill_price,
            realized_pnl,
        }
    }
}

/// Reason an entry was blocked before reaching the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    DailyLossLimit { daily_loss: f64, limit: f64 },
    TotalLossLimit { total_loss: f64, limit: f64 },
    PositionAlreadyOpen,
    MaxOpenPositions,
    CapitalAllocation { requested: f64, available: f64 },
    TradingDisabled,
    PreCloseWindow,
    Other(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::DailyLossLimit { daily_loss, limit } => {
                write!(f, "daily loss {daily_loss:.2} reached limit {limit:.2}")
            }
            RejectionReason::TotalLossLimit { total_loss, limit } => {
                write!(f, "total loss {total_loss:.2} reached limit {limit:.2}")
            }
            RejectionReason::PositionAlreadyOpen => write!(f, "strategy already holds a position"),
            RejectionReason::MaxOpenPositions => write!(f, "account-wide open position cap reached"),
            RejectionReason::CapitalAllocation { requested, available } => write!(
                f,
                "capital allocation exceeded: requested {requested:.2}, available {available:.2}"
            ),
            RejectionReason::TradingDisabled => write!(f, "trading disabled"),
            RejectionReason::PreCloseWindow => write!(f, "inside pre-close window"),
            RejectionReason::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Current state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
    /// Total loss limit breached: entries blocked, exits continue.
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Halted => write!(f, "halted"),
        }
    }
}

/// Latest indicator values. `None` until the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ma300: Option<f64>,
    pub ma350: Option<f64>,
    pub ma400: Option<f64>,
    pub vwap: Option<f64>,
}

/// Point-in-time view of the engine for controllers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub running: bool,
    pub trading_enabled: bool,
    pub positions: Vec<Position>,
    pub strategies: Vec<(StrategyId, StrategyState)>,
    pub daily_pnl: f64,
    pub total_pnl: f64,
    pub indicators: IndicatorSnapshot,
}

/// Commands sent to the engine via the command channel.
#[derive(Debug)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
    CloseAll,
    ClosePosition(StrategyId),
    UpdateRiskSettings {
        settings: RiskSettings,
        reply: oneshot::Sender<Result<()>>,
    },
    Status(oneshot::Sender<EngineStatus>),
}

/// Diagnostic events emitted by the engine alongside the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    EntryRejected {
        strategy: StrategyId,
        reason: RejectionReason,
    },
    OrderFailed {
        strategy: StrategyId,
        action: TradeAction,
        attempts: u32,
        error: String,
    },
    ForcedExit {
        strategy: StrategyId,
    },
    DailyLimitBreached {
        daily_loss: f64,
    },
    TotalLimitBreached {
        total_loss: f64,
    },
    ConnectivityLost {
        reason: String,
    },
    ConnectivityRestored,
    SessionStarted {
        date: NaiveDate,
        open_price: f64,
    },
    /// Net broker quantity for the traded symbol differs from the tracker.
    PositionMismatch {
        broker_net: i64,
        tracked_net: i64,
    },
}
