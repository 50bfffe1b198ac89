use thiserror::Error;

use crate::RejectionReason;

#[derive(Debug, Error)]
pub enum Error {
    /// A candle or indicator needed for evaluation is missing or still warming up.
    #[error("Data not ready: {0}")]
    DataNotReady(String),

    /// Soft block: suppresses new entries, exits still proceed.
    #[error("Risk limit exceeded: {reason}")]
    RiskLimitExceeded { reason: RejectionReason },

    /// A single broker call failed.
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Order failed after {attempts} attempt(s): {last_error}")]
    OrderFailed { attempts: u32, last_error: String },

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_ready(what: impl Into<String>) -> Self {
        Error::DataNotReady(what.into())
    }

    pub fn rejected(reason: RejectionReason) -> Self {
        Error::RiskLimitExceeded { reason }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
