use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Risk appetite tier; bounds the number of contracts per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTier {
    pub fn max_contracts(self) -> u32 {
        match self {
            RiskTier::Conservative => 3,
            RiskTier::Moderate => 5,
            RiskTier::Aggressive => 8,
        }
    }
}

/// User-supplied risk parameters. Read-only during an evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Currency amount risked on a single trade at the stop-loss distance.
    pub max_risk_per_trade: f64,
    /// Stop distance as a fraction of price (e.g. 0.01 = 1%).
    pub stop_loss_pct: f64,
    /// Realized loss for the session that blocks further entries.
    pub daily_loss_limit: f64,
    /// Cumulative realized loss that halts trading.
    pub total_loss_limit: f64,
    pub tier: RiskTier,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 125.0,
            stop_loss_pct: 0.01,
            daily_loss_limit: 500.0,
            total_loss_limit: 1_500.0,
            tier: RiskTier::Conservative,
        }
    }
}

impl RiskSettings {
    pub fn validate(&self) -> Result<()> {
        positive("max_risk_per_trade", self.max_risk_per_trade)?;
        positive("daily_loss_limit", self.daily_loss_limit)?;
        positive("total_loss_limit", self.total_loss_limit)?;
        if !(self.stop_loss_pct.is_finite() && self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(Error::Config(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        Ok(())
    }
}

/// Contract specification of the traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Currency value of one tick for one contract.
    pub tick_value: f64,
    /// Currency value of a one-point move for one contract.
    pub contract_multiplier: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        // Micro E-mini Nasdaq-100
        Self {
            symbol: "MNQ".to_string(),
            tick_size: 0.25,
            tick_value: 0.50,
            contract_multiplier: 2.0,
        }
    }
}

impl InstrumentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config("instrument symbol must not be empty".into()));
        }
        positive("tick_size", self.tick_size)?;
        positive("tick_value", self.tick_value)?;
        positive("contract_multiplier", self.contract_multiplier)
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be a positive number, got {value}")))
    }
}
