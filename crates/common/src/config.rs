use crate::{Error, Result};

/// Process-level configuration loaded from environment variables at startup.
/// Engine parameters live in the TOML file named by `config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the engine TOML file.
    pub config_path: String,

    /// Newline-delimited JSON market events to replay.
    pub feed_path: String,

    // Paper broker
    pub paper_slippage_bps: f64,

    /// Overrides `[limits] account_capital` from the TOML file.
    pub account_capital: Option<f64>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            config_path: optional_env("ORB_CONFIG_PATH")
                .unwrap_or_else(|| "config/orb.toml".to_string()),
            feed_path: required_env("ORB_FEED_PATH")?,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS")?.unwrap_or(0.0),
            account_capital: parsed_env("ORB_ACCOUNT_CAPITAL")?,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env(key: &str) -> Result<Option<f64>> {
    optional_env(key)
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| Error::Config(format!("{key} must be a number, got '{v}'")))
        })
        .transpose()
}
