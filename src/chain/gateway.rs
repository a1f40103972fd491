//! Chain Gateway (spec §4.1, component C1).
//!
//! Grounded on `engine/src/evm/rpc.rs`'s `EvmRpcClient`: a thin wrapper
//! around an `ethers::providers::Provider<Http>` that normalizes the handful
//! of reads every adapter needs and turns "no value returned" into an error
//! rather than an `Option` the caller must remember to check.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{prelude::*, types::transaction::eip2718::TypedTransaction};

use crate::error::AdapterError;

/// The abstract block tags this runtime reads against. Informational reads
/// use `Latest`; reads that must reflect a just-broadcast, unconfirmed write
/// use `Pending` (spec §4.1, and the §9 open question this crate resolves by
/// annotating each call site rather than leaving it ambiguous).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

impl From<BlockTag> for BlockNumber {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumber::Latest,
            BlockTag::Pending => BlockNumber::Pending,
        }
    }
}

#[cfg(test)]
use mockall::automock;

/// A scoped client for a single chain id (spec §4.1: "Clients are acquired
/// for the duration of a single adapter operation").
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn eth_call(&self, to: Address, data: Bytes, block: BlockTag) -> Result<Bytes, AdapterError>;

    async fn get_balance(&self, address: Address, block: BlockTag) -> Result<U256, AdapterError>;

    async fn get_block_number(&self, tag: BlockTag) -> Result<U64, AdapterError>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AdapterError>;

    async fn get_logs(&self, filter: Filter) -> Result<Vec<Log>, AdapterError>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AdapterError>;

    async fn fee_history(
        &self,
        block_count: U256,
        newest_block: BlockNumber,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, AdapterError>;

    async fn get_transaction_count(&self, address: Address, block: BlockTag) -> Result<U256, AdapterError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, AdapterError>;

    /// `eth_gasPrice`, used for legacy (non-EIP-1559) fee selection (spec §4.5).
    async fn gas_price(&self) -> Result<U256, AdapterError>;
}

/// Live implementation over a single HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct EvmChainGateway {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
}

impl EvmChainGateway {
    pub fn new(http_endpoint: &str, chain_id: u64) -> Result<Self, AdapterError> {
        let provider = Provider::<Http>::try_from(http_endpoint)
            .map_err(|e| AdapterError::config(format!("invalid RPC endpoint {http_endpoint}: {e}")))?;
        Ok(Self { provider: Arc::new(provider), chain_id })
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }
}

#[async_trait]
impl ChainReader for EvmChainGateway {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn eth_call(&self, to: Address, data: Bytes, block: BlockTag) -> Result<Bytes, AdapterError> {
        let tx = TypedTransaction::Legacy(TransactionRequest::new().to(to).data(data));
        let block_number: BlockNumber = block.into();
        Ok(self.provider.call(&tx, Some(block_number.into())).await?)
    }

    async fn get_balance(&self, address: Address, block: BlockTag) -> Result<U256, AdapterError> {
        let block_number: BlockNumber = block.into();
        Ok(self.provider.get_balance(address, Some(block_number.into())).await?)
    }

    async fn get_block_number(&self, tag: BlockTag) -> Result<U64, AdapterError> {
        match tag {
            BlockTag::Latest => Ok(self.provider.get_block_number().await?),
            BlockTag::Pending => {
                let block = self
                    .provider
                    .get_block(BlockNumber::Pending)
                    .await?
                    .ok_or_else(|| AdapterError::Rpc("pending block unavailable".into()))?;
                block
                    .number
                    .ok_or_else(|| AdapterError::Rpc("pending block has no number".into()))
            },
        }
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AdapterError> {
        Ok(self.provider.get_transaction_receipt(tx_hash).await?)
    }

    async fn get_logs(&self, filter: Filter) -> Result<Vec<Log>, AdapterError> {
        Ok(self.provider.get_logs(&filter).await?)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AdapterError> {
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    async fn fee_history(
        &self,
        block_count: U256,
        newest_block: BlockNumber,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, AdapterError> {
        Ok(self.provider.fee_history(block_count, newest_block, reward_percentiles).await?)
    }

    async fn get_transaction_count(&self, address: Address, block: BlockTag) -> Result<U256, AdapterError> {
        let block_number: BlockNumber = block.into();
        Ok(self.provider.get_transaction_count(address, Some(block_number.into())).await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, AdapterError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }

    async fn gas_price(&self) -> Result<U256, AdapterError> {
        Ok(self.provider.get_gas_price().await?)
    }
}
