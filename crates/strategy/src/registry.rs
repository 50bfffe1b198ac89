use tracing::info;

use common::StrategyId;

use crate::config::StrategySet;
use crate::{ConcretumBands, OpeningCandle, Strategy, VwapTrend};

/// Holds the active strategy instances in evaluation order.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build the registry from the enabled set.
    pub fn from_config(set: &StrategySet) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = StrategyId::ALL
            .into_iter()
            .filter(|id| set.is_enabled(*id))
            .map(build_strategy)
            .inspect(|s| info!(strategy = %s.id(), profile = ?s.risk_profile(), "Registered strategy"))
            .collect();

        Self { strategies }
    }

    pub fn get_mut(&mut self, id: StrategyId) -> Option<&mut (dyn Strategy + 'static)> {
        self.strategies
            .iter_mut()
            .find(|s| s.id() == id)
            .map(|s| s.as_mut())
    }

    pub fn contains(&self, id: StrategyId) -> bool {
        self.strategies.iter().any(|s| s.id() == id)
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

fn build_strategy(id: StrategyId) -> Box<dyn Strategy> {
    match id {
        StrategyId::OpeningCandle => Box::new(OpeningCandle::new()),
        StrategyId::VwapTrend => Box::new(VwapTrend::new()),
        StrategyId::ConcretumBands => Box::new(ConcretumBands::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_enabled_strategies_in_order() {
        let registry = StrategyRegistry::from_config(&StrategySet::default());
        assert_eq!(registry.ids(), StrategyId::ALL.to_vec());
    }

    #[test]
    fn disabled_strategies_are_skipped() {
        let mut registry = StrategyRegistry::from_config(&StrategySet::only(StrategyId::VwapTrend));
        assert_eq!(registry.len(), 1);
        assert!(registry.get_mut(StrategyId::VwapTrend).is_some());
        assert!(registry.get_mut(StrategyId::OpeningCandle).is_none());
        assert!(!registry.contains(StrategyId::ConcretumBands));
    }
}
