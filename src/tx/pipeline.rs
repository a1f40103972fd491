//! Transaction Pipeline (spec §4.5, component C5).
//!
//! Grounded on `engine/src/evm/rpc.rs`'s `get_next_nonce` (pending-nonce
//! cache, 120s `NONCE_LIFETIME` reset) and `engine/src/evm/retry_rpc.rs`'s
//! gas-estimation-with-buffer broadcast flow, generalized to also select
//! legacy fees (the teacher only targets EIP-1559 chains).

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use tokio::sync::Mutex;

use crate::{
    chain::{BlockTag, ChainReader},
    constants::{
        DEFAULT_MAX_RETRIES, DEFAULT_TRANSACTION_TIMEOUT, GAS_BUFFER_MULTIPLIER_DEN,
        GAS_BUFFER_MULTIPLIER_NUM, MAX_BASE_FEE_GROWTH_MULTIPLIER, NONCE_LIFETIME,
        SUGGESTED_GAS_PRICE_MULTIPLIER_DEN, SUGGESTED_GAS_PRICE_MULTIPLIER_NUM,
        SUGGESTED_PRIORITY_FEE_MULTIPLIER_DEN, SUGGESTED_PRIORITY_FEE_MULTIPLIER_NUM,
    },
    error::AdapterError,
};

/// A transaction not yet filled in with chain id, nonce, gas, or fees — the
/// caller supplies only what it knows (spec §4.5 step 1).
#[derive(Debug, Clone)]
pub struct UnsignedCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl UnsignedCall {
    pub fn new(to: Address, data: Bytes, value: U256) -> Self {
        Self { to, data, value }
    }
}

/// Fully-populated transaction request ready for the signer callback.
#[derive(Debug, Clone)]
pub enum FilledTransaction {
    Eip1559 {
        chain_id: u64,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: U256,
        gas: U256,
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    Legacy {
        chain_id: u64,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: U256,
        gas: U256,
        gas_price: U256,
    },
}

/// The opaque signing callback (spec §6, §9 "Opaque signing callback"): an
/// async function turning a filled, unsigned transaction into raw signed
/// bytes. The core never reads the private key.
#[async_trait]
pub trait TxSender: Send + Sync {
    async fn sign(&self, tx: &FilledTransaction) -> Result<Bytes, AdapterError>;

    fn address(&self) -> Address;
}

/// How a broadcast or receipt-poll failure should be handled (spec §4.5
/// "Retry classifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Surfaced after `max_retries`, `2*(attempt+1)s` backoff between tries.
    Revert,
    /// Retried with a flat `1s` sleep.
    Transient,
    /// Never retried (bad signature, chain mismatch).
    Fatal,
}

pub fn classify_broadcast_error(message: &str) -> RetryClass {
    let lower = message.to_ascii_lowercase();
    if lower.contains("revert") || lower.contains("execution reverted") {
        RetryClass::Revert
    } else if lower.contains("invalid signature")
        || lower.contains("chain id")
        || lower.contains("nonce too low")
    {
        RetryClass::Fatal
    } else {
        RetryClass::Transient
    }
}

#[derive(Clone)]
struct NonceInfo {
    next_nonce: U256,
    requested_at: Instant,
}

/// Per-wallet nonce cache plus the fee-selection/broadcast/retry logic (spec
/// §4.5). One `TxPipeline` is shared across adapters, mirroring the Chain
/// Gateway's sharing policy (spec §5).
#[derive(Clone, Default)]
pub struct TxPipeline {
    nonces: Arc<Mutex<HashMap<(u64, Address), NonceInfo>>>,
}

impl TxPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    async fn next_nonce(&self, chain: &dyn ChainReader, address: Address) -> Result<U256, AdapterError> {
        let key = (chain.chain_id(), address);
        let mut nonces = self.nonces.lock().await;

        let stale = nonces.get(&key).is_some_and(|info| info.requested_at.elapsed() > NONCE_LIFETIME);
        if stale {
            nonces.remove(&key);
        }

        if let Some(info) = nonces.get_mut(&key) {
            let nonce = info.next_nonce;
            info.next_nonce += U256::one();
            return Ok(nonce);
        }

        let nonce = chain.get_transaction_count(address, BlockTag::Pending).await?;
        nonces.insert(key, NonceInfo { next_nonce: nonce + U256::one(), requested_at: Instant::now() });
        Ok(nonce)
    }

    /// Resets the cached nonce for `address` on `chain` so the next send
    /// re-queries it (mirrors the teacher's reset-on-broadcast-error).
    async fn reset_nonce(&self, chain_id: u64, address: Address) {
        self.nonces.lock().await.remove(&(chain_id, address));
    }

    async fn select_fees(
        &self,
        chain: &dyn ChainReader,
        chain_id: u64,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: U256,
    ) -> Result<FilledTransaction, AdapterError> {
        let gas_estimate =
            estimate_with_buffer(chain, &ethers::types::transaction::eip2718::TypedTransaction::Legacy(
                ethers::types::TransactionRequest::new().to(to).data(data.clone()).value(value).from(from),
            ))
            .await?;

        match chain
            .fee_history(U256::from(1u64), ethers::types::BlockNumber::Latest, &[50.0])
            .await
        {
            Ok(history) if history.base_fee_per_gas.iter().any(|f| !f.is_zero()) => {
                let base_fee = *history.base_fee_per_gas.last().expect("checked non-empty above");
                let rpc_priority = history
                    .reward
                    .last()
                    .and_then(|rewards| rewards.first())
                    .copied()
                    .unwrap_or_default();

                let max_priority_fee_per_gas =
                    rpc_priority * U256::from(SUGGESTED_PRIORITY_FEE_MULTIPLIER_NUM)
                        / U256::from(SUGGESTED_PRIORITY_FEE_MULTIPLIER_DEN);
                let max_fee_per_gas = base_fee * U256::from(MAX_BASE_FEE_GROWTH_MULTIPLIER) + max_priority_fee_per_gas;

                Ok(FilledTransaction::Eip1559 {
                    chain_id,
                    from,
                    to,
                    data,
                    value,
                    nonce,
                    gas: gas_estimate,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                })
            },
            _ => {
                let gas_price = chain.gas_price().await?;
                let gas_price =
                    gas_price * U256::from(SUGGESTED_GAS_PRICE_MULTIPLIER_NUM) / U256::from(SUGGESTED_GAS_PRICE_MULTIPLIER_DEN);

                Ok(FilledTransaction::Legacy { chain_id, from, to, data, value, nonce, gas: gas_estimate, gas_price })
            },
        }
    }

    /// `send_transaction` (spec §4.5): fills, estimates gas, selects fees,
    /// assigns the next nonce, signs, broadcasts, and — if `wait_for_receipt`
    /// — polls for a receipt with a non-null block number, retrying per the
    /// classifier.
    pub async fn send_transaction(
        &self,
        chain: &dyn ChainReader,
        sender: &dyn TxSender,
        call: UnsignedCall,
        wait_for_receipt: bool,
    ) -> Result<H256, AdapterError> {
        let chain_id = chain.chain_id();
        let from = sender.address();

        let mut attempt = 0u32;
        loop {
            let nonce = self.next_nonce(chain, from).await?;
            let filled =
                self.select_fees(chain, chain_id, from, call.to, call.data.clone(), call.value, nonce).await?;

            match self.broadcast_once(chain, sender, &filled, wait_for_receipt).await {
                Ok(hash) => return Ok(hash),
                Err(err) => {
                    self.reset_nonce(chain_id, from).await;
                    let class = classify_broadcast_error(&err.to_string());
                    if class == RetryClass::Fatal || attempt >= DEFAULT_MAX_RETRIES {
                        return Err(err);
                    }
                    let sleep = match class {
                        RetryClass::Revert => Duration::from_secs(2 * (attempt as u64 + 1)),
                        _ => Duration::from_secs(1),
                    };
                    tokio::time::sleep(sleep).await;
                    attempt += 1;
                },
            }
        }
    }

    /// Convenience wrapper used by `erc20::ensure_allowance` and other
    /// internal call sites that always want to wait for the receipt.
    pub async fn send_and_wait(
        &self,
        chain: &dyn ChainReader,
        sender: &dyn TxSender,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<H256, AdapterError> {
        self.send_transaction(chain, sender, UnsignedCall::new(to, data, value), true).await
    }

    async fn broadcast_once(
        &self,
        chain: &dyn ChainReader,
        sender: &dyn TxSender,
        filled: &FilledTransaction,
        wait_for_receipt: bool,
    ) -> Result<H256, AdapterError> {
        let raw = sender.sign(filled).await?;
        let tx_hash = chain.send_raw_transaction(raw).await?;

        if wait_for_receipt {
            self.poll_receipt(chain, tx_hash).await?;
        }
        Ok(tx_hash)
    }

    async fn poll_receipt(&self, chain: &dyn ChainReader, tx_hash: H256) -> Result<TransactionReceipt, AdapterError> {
        let deadline = Instant::now() + DEFAULT_TRANSACTION_TIMEOUT;
        loop {
            if let Some(receipt) = chain.get_transaction_receipt(tx_hash).await? {
                if receipt.block_number.is_some() {
                    return Ok(receipt);
                }
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::Rpc(format!(
                    "timed out after {:?} waiting for receipt of {tx_hash:#x}",
                    DEFAULT_TRANSACTION_TIMEOUT
                )));
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

async fn estimate_with_buffer(
    chain: &dyn ChainReader,
    tx: &ethers::types::transaction::eip2718::TypedTransaction,
) -> Result<U256, AdapterError> {
    let raw_estimate = chain.estimate_gas(tx).await?;
    Ok(raw_estimate * U256::from(GAS_BUFFER_MULTIPLIER_NUM) / U256::from(GAS_BUFFER_MULTIPLIER_DEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_revert_message() {
        assert_eq!(classify_broadcast_error("execution reverted: insufficient balance"), RetryClass::Revert);
    }

    #[test]
    fn classify_fatal_message() {
        assert_eq!(classify_broadcast_error("invalid signature for chain id 1"), RetryClass::Fatal);
    }

    #[test]
    fn classify_transient_message() {
        assert_eq!(classify_broadcast_error("connection reset by peer"), RetryClass::Transient);
    }
}
