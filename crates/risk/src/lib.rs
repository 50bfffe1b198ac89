pub mod governor;
pub mod tracker;

pub use governor::{LimitBreach, RiskGovernor, RiskLimits};
pub use tracker::{PositionTracker, MAX_OPEN_POSITIONS};

/// Hard ceiling on the fraction of account capital open positions may commit.
pub const MAX_ALLOCATION_PCT: f64 = 0.30;
