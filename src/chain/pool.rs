//! Lazily-populated, write-once-per-key chain gateway cache (spec §3
//! Ownership, §5 Shared-resource policy: "the first writer wins; races
//! produce identical values so no lock is required").

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{config::RuntimeConfig, error::AdapterError};

use super::gateway::EvmChainGateway;

#[derive(Clone)]
pub struct ChainGatewayPool {
    config: RuntimeConfig,
    gateways: Arc<RwLock<HashMap<String, EvmChainGateway>>>,
}

impl ChainGatewayPool {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config, gateways: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// `scoped_client(chain_id)` from spec §4.1, keyed on the config's
    /// logical chain name (e.g. `"ethereum"`, `"arbitrum"`).
    pub async fn get(&self, chain_name: &str) -> Result<EvmChainGateway, AdapterError> {
        if let Some(gateway) = self.gateways.read().await.get(chain_name) {
            return Ok(gateway.clone());
        }

        let endpoints = self.config.chain(chain_name).map_err(|e| AdapterError::config(e.to_string()))?;
        let gateway = EvmChainGateway::new(&endpoints.http_endpoint, endpoints.expected_chain_id)?;

        let mut write_guard = self.gateways.write().await;
        Ok(write_guard.entry(chain_name.to_string()).or_insert(gateway).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_chain_is_a_config_error() {
        let pool = ChainGatewayPool::new(RuntimeConfig::default());
        let err = pool.get("ethereum").await.unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
