use std::collections::BTreeMap;

use tracing::info;

use common::{Error, Position, RejectionReason, Result, StrategyId};

/// Hard ceiling on simultaneous open positions across all strategies.
pub const MAX_OPEN_POSITIONS: usize = 3;

/// Sole owner of open positions and committed capital per strategy.
///
/// Mutated only through `record_entry`/`record_exit`, after a confirmed fill.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    positions: BTreeMap<StrategyId, Position>,
    capital_used: BTreeMap<StrategyId, f64>,
    max_open: usize,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(MAX_OPEN_POSITIONS)
    }
}

impl PositionTracker {
    pub fn new(max_open: usize) -> Self {
        Self {
            positions: BTreeMap::new(),
            capital_used: BTreeMap::new(),
            max_open: max_open.min(MAX_OPEN_POSITIONS),
        }
    }

    /// Why `strategy` may not open a position right now, if anything.
    pub fn check_can_open(&self, strategy: StrategyId) -> Result<(), RejectionReason> {
        if self.positions.contains_key(&strategy) {
            return Err(RejectionReason::PositionAlreadyOpen);
        }
        if self.positions.len() >= self.max_open {
            return Err(RejectionReason::MaxOpenPositions);
        }
        Ok(())
    }

    pub fn can_open(&self, strategy: StrategyId) -> bool {
        self.check_can_open(strategy).is_ok()
    }

    /// Record a filled entry committing `notional` of capital.
    pub fn record_entry(&mut self, position: Position, notional: f64) -> Result<()> {
        let strategy = position.strategy;
        self.check_can_open(strategy)
            .map_err(|reason| Error::Other(format!("cannot record entry for {strategy}: {reason}")))?;

        info!(
            strategy = %strategy,
            side = %position.side,
            qty = position.quantity,
            price = position.entry_price,
            notional,
            "Position recorded"
        );
        self.positions.insert(strategy, position);
        *self.capital_used.entry(strategy).or_insert(0.0) += notional;
        Ok(())
    }

    /// Record a filled exit. Releases the strategy's committed capital.
    pub fn record_exit(&mut self, strategy: StrategyId) -> Option<Position> {
        let removed = self.positions.remove(&strategy)?;
        self.capital_used.remove(&strategy);
        info!(strategy = %strategy, open_positions = self.positions.len(), "Position removed from tracking after close");
        Some(removed)
    }

    pub fn position(&self, strategy: StrategyId) -> Option<&Position> {
        self.positions.get(&strategy)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn capital_used(&self, strategy: StrategyId) -> f64 {
        self.capital_used.get(&strategy).copied().unwrap_or(0.0)
    }

    pub fn total_capital_used(&self) -> f64 {
        self.capital_used.values().sum()
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }
}
