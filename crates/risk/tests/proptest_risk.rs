use proptest::prelude::*;
use common::{InstrumentConfig, Position, RiskProfile, RiskSettings, RiskTier, Side, StrategyId};
use risk::{PositionTracker, RiskGovernor, RiskLimits, MAX_OPEN_POSITIONS};

fn tier() -> impl Strategy<Value = RiskTier> {
    prop_oneof![
        Just(RiskTier::Conservative),
        Just(RiskTier::Moderate),
        Just(RiskTier::Aggressive),
    ]
}

fn strategy_id() -> impl Strategy<Value = StrategyId> {
    prop_oneof![
        Just(StrategyId::OpeningCandle),
        Just(StrategyId::VwapTrend),
        Just(StrategyId::ConcretumBands),
    ]
}

proptest! {
    /// Position size stays within [1, tier max] for any valid settings and price.
    #[test]
    fn sizing_is_always_within_tier_bounds(
        max_risk in 0.01f64..100_000.0f64,
        stop_loss_pct in 0.0001f64..0.5f64,
        price in 0.01f64..1_000_000.0f64,
        tier in tier(),
        boosted in any::<bool>(),
    ) {
        let settings = RiskSettings {
            max_risk_per_trade: max_risk,
            stop_loss_pct,
            tier,
            ..RiskSettings::default()
        };
        let governor = RiskGovernor::new(settings, RiskLimits::default(), InstrumentConfig::default()).unwrap();
        let profile = if boosted { RiskProfile::Boosted } else { RiskProfile::Base };

        let size = governor.size_position(profile, price).unwrap();
        prop_assert!(size >= 1);
        prop_assert!(size <= tier.max_contracts());
    }

    /// Random entry/exit sequences never break the per-strategy, aggregate or
    /// capital invariants when every entry goes through the gates.
    #[test]
    fn tracker_invariants_hold(ops in prop::collection::vec((strategy_id(), any::<bool>(), 1u32..4, 100.0f64..40_000.0f64), 1..60)) {
        let governor = RiskGovernor::new(RiskSettings::default(), RiskLimits::default(), InstrumentConfig::default()).unwrap();
        let mut tracker = PositionTracker::default();
        let cap = governor.limits().allocation_cap();

        for (strategy, enter, qty, price) in ops {
            if enter {
                let notional = governor.notional(price, qty);
                if tracker.can_open(strategy)
                    && governor.check_capital_allocation(&tracker, strategy, notional).is_ok()
                {
                    let position = Position {
                        strategy,
                        side: Side::Long,
                        quantity: qty,
                        entry_price: price,
                        entry_time: chrono::Utc::now(),
                    };
                    tracker.record_entry(position, notional).unwrap();
                }
            } else {
                tracker.record_exit(strategy);
                prop_assert_eq!(tracker.capital_used(strategy), 0.0);
            }

            prop_assert!(tracker.open_count() <= MAX_OPEN_POSITIONS);
            prop_assert!(tracker.total_capital_used() <= cap + 1e-6);
            let positions: Vec<_> = tracker.positions().collect();
            for id in StrategyId::ALL {
                prop_assert!(positions.iter().filter(|p| p.strategy == id).count() <= 1);
            }
        }
    }

    /// Daily P&L never goes below the limit without the block engaging.
    #[test]
    fn daily_block_tracks_realized_loss(pnls in prop::collection::vec(-400.0f64..400.0f64, 1..40)) {
        let mut governor = RiskGovernor::new(RiskSettings::default(), RiskLimits::default(), InstrumentConfig::default()).unwrap();
        let mut breached = false;
        for pnl in pnls {
            governor.record_realized(pnl);
            breached |= governor.daily_loss() >= governor.settings().daily_loss_limit;
            prop_assert_eq!(governor.check_daily_limit().is_err(), breached);
        }
    }
}
