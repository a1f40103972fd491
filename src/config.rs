//! Runtime configuration loading, grounded on `chainflip-engine`'s
//! `settings.rs` (the `config` crate layered over a TOML file, overridable by
//! environment variables).
//!
//! The optional signing callback is never part of this struct: per spec §3
//! ("The caller owns the wallet address and the signing callback; the
//! adapter never persists either"), it is supplied programmatically when an
//! adapter is constructed, not deserialized.

use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Endpoints for a single chain's JSON-RPC node.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainEndpoints {
    pub http_endpoint: String,
    pub expected_chain_id: u64,
}

/// Endpoints for the rate-swap venue's HTTP API.
#[derive(Debug, Deserialize, Clone)]
pub struct RateSwapApiConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub chains: HashMap<String, ChainEndpoints>,

    #[serde(default)]
    pub rate_swap_api: Option<RateSwapApiConfig>,

    /// Free-form per-adapter overrides (spec §3 "Lifecycle": adapters are
    /// constructed with an optional `config` map).
    #[serde(default)]
    pub adapter_overrides: HashMap<String, serde_json::Value>,
}

impl RuntimeConfig {
    /// Loads `config/default.toml` (if present) then layers
    /// `WAYFINDER__<SECTION>__<KEY>` environment variables on top, mirroring
    /// `Settings::new` in `engine/src/settings.rs`.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix(crate::constants::CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        builder.build()?.try_deserialize()
    }

    pub fn chain(&self, chain_name: &str) -> Result<&ChainEndpoints, ConfigError> {
        self.chains
            .get(chain_name)
            .ok_or_else(|| ConfigError::NotFound(format!("chains.{chain_name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chain_is_a_not_found_error() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.chain("ethereum").is_err());
    }
}
