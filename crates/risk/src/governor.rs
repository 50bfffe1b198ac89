use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Error, InstrumentConfig, RejectionReason, Result, RiskProfile, RiskSettings, StrategyId};

use crate::tracker::PositionTracker;

/// Account-level limits that are not user-adjustable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Total account capital in currency units.
    pub account_capital: f64,
    /// Fraction of account capital that open positions may commit (0.30 = 30%).
    pub max_allocation_pct: f64,
    pub max_open_positions: usize,
    /// Risk multiplier for `RiskProfile::Boosted` strategies.
    pub boosted_risk_multiplier: f64,
    /// Absolute ceiling on the boosted risk amount.
    pub boosted_risk_ceiling: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            account_capital: 250_000.0,
            max_allocation_pct: 0.30,
            max_open_positions: crate::MAX_OPEN_POSITIONS,
            boosted_risk_multiplier: 1.5,
            boosted_risk_ceiling: 200.0,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<()> {
        if !(self.account_capital.is_finite() && self.account_capital > 0.0) {
            return Err(Error::Config(format!(
                "account_capital must be positive, got {}",
                self.account_capital
            )));
        }
        if !(self.max_allocation_pct > 0.0 && self.max_allocation_pct <= crate::MAX_ALLOCATION_PCT) {
            return Err(Error::Config(format!(
                "max_allocation_pct must be in (0, {}], got {}",
                crate::MAX_ALLOCATION_PCT,
                self.max_allocation_pct
            )));
        }
        if self.max_open_positions == 0 || self.max_open_positions > crate::MAX_OPEN_POSITIONS {
            return Err(Error::Config(format!(
                "max_open_positions must be in 1..={}, got {}",
                crate::MAX_OPEN_POSITIONS,
                self.max_open_positions
            )));
        }
        if !(self.boosted_risk_multiplier.is_finite() && self.boosted_risk_multiplier >= 1.0) {
            return Err(Error::Config("boosted_risk_multiplier must be >= 1".into()));
        }
        if !(self.boosted_risk_ceiling.is_finite() && self.boosted_risk_ceiling > 0.0) {
            return Err(Error::Config("boosted_risk_ceiling must be positive".into()));
        }
        Ok(())
    }

    /// Capital that all open positions together may commit.
    pub fn allocation_cap(&self) -> f64 {
        self.account_capital * self.max_allocation_pct
    }
}

/// A loss limit that was crossed by the most recent realized P&L update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBreach {
    Daily { daily_loss: f64 },
    Total { total_loss: f64 },
}

/// Sizes entries and enforces loss limits and capital allocation.
///
/// Owned by the engine's single consumer; P&L is updated only from confirmed
/// exit fills via `record_realized`.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    settings: RiskSettings,
    limits: RiskLimits,
    instrument: InstrumentConfig,
    daily_pnl: f64,
    total_pnl: f64,
    daily_blocked: bool,
    halted: bool,
}

impl RiskGovernor {
    pub fn new(settings: RiskSettings, limits: RiskLimits, instrument: InstrumentConfig) -> Result<Self> {
        settings.validate()?;
        limits.validate()?;
        instrument.validate()?;
        Ok(Self {
            settings,
            limits,
            instrument,
            daily_pnl: 0.0,
            total_pnl: 0.0,
            daily_blocked: false,
            halted: false,
        })
    }

    // ─── Loss limits ──────────────────────────────────────────────────────

    pub fn daily_loss(&self) -> f64 {
        (-self.daily_pnl).max(0.0)
    }

    pub fn total_loss(&self) -> f64 {
        (-self.total_pnl).max(0.0)
    }

    /// Blocks entries once the session's realized loss reaches the daily
    /// limit. The block holds until `start_session`.
    pub fn check_daily_limit(&mut self) -> Result<(), RejectionReason> {
        let daily_loss = self.daily_loss();
        if self.daily_blocked || daily_loss >= self.settings.daily_loss_limit {
            self.daily_blocked = true;
            return Err(RejectionReason::DailyLossLimit {
                daily_loss,
                limit: self.settings.daily_loss_limit,
            });
        }
        Ok(())
    }

    /// Blocks entries for the rest of the process once the cumulative
    /// realized loss reaches the total limit.
    pub fn check_total_limit(&mut self) -> Result<(), RejectionReason> {
        let total_loss = self.total_loss();
        if self.halted || total_loss >= self.settings.total_loss_limit {
            self.halted = true;
            return Err(RejectionReason::TotalLossLimit {
                total_loss,
                limit: self.settings.total_loss_limit,
            });
        }
        Ok(())
    }

    /// Both loss limits, total first.
    pub fn check_entry(&mut self) -> Result<(), RejectionReason> {
        self.check_total_limit()?;
        self.check_daily_limit()
    }

    /// Apply a realized P&L from a closed position. Returns the limits this
    /// update newly crossed.
    pub fn record_realized(&mut self, pnl: f64) -> Vec<LimitBreach> {
        self.daily_pnl += pnl;
        self.total_pnl += pnl;
        info!(pnl, daily_pnl = self.daily_pnl, total_pnl = self.total_pnl, "Realized P&L recorded");

        let mut breaches = Vec::new();
        if !self.halted && self.total_loss() >= self.settings.total_loss_limit {
            self.halted = true;
            warn!(total_loss = self.total_loss(), limit = self.settings.total_loss_limit, "Total loss limit reached");
            breaches.push(LimitBreach::Total { total_loss: self.total_loss() });
        }
        if !self.daily_blocked && self.daily_loss() >= self.settings.daily_loss_limit {
            self.daily_blocked = true;
            warn!(daily_loss = self.daily_loss(), limit = self.settings.daily_loss_limit, "Daily loss limit reached");
            breaches.push(LimitBreach::Daily { daily_loss: self.daily_loss() });
        }
        breaches
    }

    /// Reset the session counters. The total-loss halt is not cleared.
    pub fn start_session(&mut self) {
        if self.daily_blocked {
            info!("Daily loss block lifted for new session");
        }
        self.daily_pnl = 0.0;
        self.daily_blocked = false;
    }

    // ─── Sizing ───────────────────────────────────────────────────────────

    pub fn risk_amount(&self, profile: RiskProfile) -> f64 {
        let base = self.settings.max_risk_per_trade;
        match profile {
            RiskProfile::Base => base,
            RiskProfile::Boosted => (base * self.limits.boosted_risk_multiplier).min(self.limits.boosted_risk_ceiling),
        }
    }

    /// Contracts to trade at `price` so that a stop-loss hit risks at most
    /// the profile's risk amount. Never below 1 or above the tier maximum.
    pub fn size_position(&self, profile: RiskProfile, price: f64) -> Result<u32> {
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::Other(format!("cannot size a position at price {price}")));
        }
        let risk_amount = self.risk_amount(profile);
        let stop_distance = price * self.settings.stop_loss_pct;
        let stop_ticks = stop_distance / self.instrument.tick_size;
        let raw = risk_amount / (stop_ticks * self.instrument.tick_value);

        let max = self.settings.tier.max_contracts();
        let size = if raw.is_finite() { raw.round().clamp(1.0, max as f64) as u32 } else { max };
        Ok(size)
    }

    /// Capital committed by `quantity` contracts at `price`.
    pub fn notional(&self, price: f64, quantity: u32) -> f64 {
        price * quantity as f64 * self.instrument.contract_multiplier
    }

    /// Reject an entry that would push the strategy's committed capital, or
    /// the account's, past the allocation cap.
    pub fn check_capital_allocation(
        &self,
        tracker: &PositionTracker,
        strategy: StrategyId,
        notional: f64,
    ) -> Result<(), RejectionReason> {
        let cap = self.limits.allocation_cap();
        let strategy_used = tracker.capital_used(strategy);
        let total_used = tracker.total_capital_used();

        if strategy_used + notional > cap || total_used + notional > cap {
            return Err(RejectionReason::CapitalAllocation {
                requested: notional,
                available: (cap - total_used.max(strategy_used)).max(0.0),
            });
        }
        Ok(())
    }

    // ─── Settings ─────────────────────────────────────────────────────────

    /// Replace the user risk settings. Invalid settings are rejected and the
    /// current ones kept.
    pub fn update_settings(&mut self, settings: RiskSettings) -> Result<()> {
        if let Err(e) = settings.validate() {
            warn!(error = %e, "Rejected risk settings update");
            return Err(e);
        }
        info!(
            max_risk_per_trade = settings.max_risk_per_trade,
            stop_loss_pct = settings.stop_loss_pct,
            daily_loss_limit = settings.daily_loss_limit,
            total_loss_limit = settings.total_loss_limit,
            tier = ?settings.tier,
            "Risk settings updated"
        );
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn instrument(&self) -> &InstrumentConfig {
        &self.instrument
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    pub fn daily_blocked(&self) -> bool {
        self.daily_blocked
    }

    pub fn halted(&self) -> bool {
        self.halted
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Position, RiskTier, Side};

    fn governor() -> RiskGovernor {
        RiskGovernor::new(RiskSettings::default(), RiskLimits::default(), InstrumentConfig::default()).unwrap()
    }

    fn open(tracker: &mut PositionTracker, strategy: StrategyId, notional: f64) {
        let position = Position {
            strategy,
            side: Side::Long,
            quantity: 1,
            entry_price: 100.0,
            entry_time: chrono::Utc::now(),
        };
        tracker.record_entry(position, notional).unwrap();
    }

    #[test]
    fn sizing_example_rounds_up_to_one_contract() {
        // 125 / ((16234.50 * 0.01 / 0.25) * 0.50) = 0.385
        let g = governor();
        assert_eq!(g.size_position(RiskProfile::Base, 16_234.50).unwrap(), 1);
    }

    #[test]
    fn sizing_is_capped_by_tier() {
        let mut g = governor();
        g.update_settings(RiskSettings {
            max_risk_per_trade: 10_000.0,
            tier: RiskTier::Moderate,
            ..RiskSettings::default()
        })
        .unwrap();
        assert_eq!(g.size_position(RiskProfile::Base, 100.0).unwrap(), 5);
    }

    #[test]
    fn sizing_rejects_bad_price() {
        let g = governor();
        assert!(g.size_position(RiskProfile::Base, 0.0).is_err());
        assert!(g.size_position(RiskProfile::Base, f64::NAN).is_err());
    }

    #[test]
    fn boosted_risk_is_scaled_and_capped() {
        let mut g = governor();
        // 125 * 1.5 = 187.5, under the ceiling
        assert_eq!(g.risk_amount(RiskProfile::Boosted), 187.5);

        g.update_settings(RiskSettings {
            max_risk_per_trade: 150.0,
            ..RiskSettings::default()
        })
        .unwrap();
        assert_eq!(g.risk_amount(RiskProfile::Boosted), 200.0);
        assert_eq!(g.risk_amount(RiskProfile::Base), 150.0);
    }

    #[test]
    fn daily_limit_blocks_until_next_session() {
        let mut g = governor();
        assert!(g.check_daily_limit().is_ok());

        let breaches = g.record_realized(-500.0);
        assert_eq!(breaches, vec![LimitBreach::Daily { daily_loss: 500.0 }]);
        assert!(matches!(g.check_daily_limit(), Err(RejectionReason::DailyLossLimit { .. })));

        // A later win does not lift the block within the session
        g.record_realized(300.0);
        assert!(g.check_daily_limit().is_err());

        g.start_session();
        assert!(g.check_daily_limit().is_ok());
        assert_eq!(g.daily_pnl(), 0.0);
        assert_eq!(g.total_pnl(), -200.0);
    }

    #[test]
    fn total_limit_halts_across_sessions() {
        let mut g = governor();
        for _ in 0..3 {
            g.record_realized(-499.0);
            g.start_session();
        }
        assert!(g.check_total_limit().is_ok());

        let breaches = g.record_realized(-3.0);
        assert!(breaches.contains(&LimitBreach::Total { total_loss: 1_500.0 }));
        assert!(g.halted());

        g.start_session();
        assert!(matches!(g.check_entry(), Err(RejectionReason::TotalLossLimit { .. })));
    }

    #[test]
    fn breaches_are_reported_once() {
        let mut g = governor();
        assert_eq!(g.record_realized(-600.0).len(), 1);
        assert!(g.record_realized(-10.0).is_empty());
    }

    #[test]
    fn capital_allocation_is_per_strategy_and_aggregate() {
        let g = governor();
        let mut tracker = PositionTracker::default();
        let cap = g.limits().allocation_cap();
        assert_eq!(cap, 75_000.0);

        assert!(g.check_capital_allocation(&tracker, StrategyId::VwapTrend, 32_469.0).is_ok());
        assert!(g.check_capital_allocation(&tracker, StrategyId::VwapTrend, 80_000.0).is_err());

        open(&mut tracker, StrategyId::OpeningCandle, 50_000.0);
        let res = g.check_capital_allocation(&tracker, StrategyId::VwapTrend, 30_000.0);
        assert_eq!(
            res,
            Err(RejectionReason::CapitalAllocation {
                requested: 30_000.0,
                available: 25_000.0
            })
        );
        assert!(g.check_capital_allocation(&tracker, StrategyId::VwapTrend, 25_000.0).is_ok());
    }

    #[test]
    fn notional_uses_contract_multiplier() {
        let g = governor();
        assert_eq!(g.notional(16_000.0, 2), 64_000.0);
    }

    #[test]
    fn invalid_settings_update_keeps_previous() {
        let mut g = governor();
        let bad = RiskSettings {
            stop_loss_pct: 0.0,
            ..RiskSettings::default()
        };
        assert!(matches!(g.update_settings(bad), Err(Error::Config(_))));
        assert_eq!(g.settings(), &RiskSettings::default());
    }

    #[test]
    fn limits_validation() {
        assert!(RiskLimits::default().validate().is_ok());
        let over = RiskLimits {
            max_allocation_pct: 0.5,
            ..RiskLimits::default()
        };
        assert!(over.validate().is_err());
        let too_many = RiskLimits {
            max_open_positions: 4,
            ..RiskLimits::default()
        };
        assert!(too_many.validate().is_err());
    }
}
