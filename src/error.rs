//! Canonical error taxonomy for the adapter runtime (spec §7).
//!
//! Every public adapter operation returns `Result<T, AdapterError>`. This
//! replaces the source system's `(bool, value_or_str)` convention: the
//! `Display` impl generated by `thiserror` is the diagnostic string callers
//! must not parse (spec §6, "Caller-visible exit codes").

use ethers::types::U256;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("{adapter} does not support {operation}")]
    Unsupported { adapter: &'static str, operation: &'static str },

    #[error("allowance error: {0}")]
    Allowance(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction reverted: {reason}")]
    Revert { reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected payload shape: {0}")]
    Schema(String),

    #[error("arithmetic overflow: {0}")]
    Arithmetic(String),
}

impl AdapterError {
    pub fn unsupported(adapter: &'static str, operation: &'static str) -> Self {
        AdapterError::Unsupported { adapter, operation }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        AdapterError::Input(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AdapterError::Config(msg.into())
    }
}

impl From<anyhow::Error> for AdapterError {
    fn from(err: anyhow::Error) -> Self {
        AdapterError::Rpc(format!("{err:#}"))
    }
}

impl From<ethers::providers::ProviderError> for AdapterError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        AdapterError::Rpc(err.to_string())
    }
}

/// Checks a write-op amount against spec §8's boundary behavior: zero or
/// negative amounts are rejected before any network activity.
pub fn require_positive_amount(amount: U256) -> Result<(), AdapterError> {
    if amount.is_zero() {
        return Err(AdapterError::input("amount must be positive"));
    }
    Ok(())
}

pub type AdapterResult<T> = Result<T, AdapterError>;
