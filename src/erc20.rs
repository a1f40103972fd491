//! ERC20 utilities and `ensure_allowance` (spec §4.4, component C4).
//!
//! The approval-reset static table lives centrally here, not scattered
//! across adapters, per spec §9: "Implementations should keep it at the
//! core, not scattered in per-adapter files, so every adapter that calls
//! `ensure_allowance` benefits uniformly."

use std::collections::HashSet;

use ethers::types::{Address, U256};
use once_cell::sync::Lazy;

use crate::{
    chain::{BlockTag, ChainReader},
    codec::erc20::{AllowanceCall, ApproveCall, BalanceOfCall, DecimalsCall, Erc20Calls, SymbolCall},
    error::AdapterError,
    tx::pipeline::{TxPipeline, TxSender},
};

/// Tokens whose `approve` rejects a non-zero -> non-zero allowance change
/// (e.g. legacy USDT on Ethereum mainnet). Keyed on `(chain_id, token)`,
/// lowercase-compared per spec §4.2's address policy.
static APPROVAL_RESET_TOKENS: Lazy<HashSet<(u64, Address)>> = Lazy::new(|| {
    let mut set = HashSet::new();
    // USDT on Ethereum mainnet.
    set.insert((1u64, "0xdAC17F958D2ee523a2206206994597C13D831ec7".parse().unwrap()));
    set
});

pub fn requires_approval_reset(chain_id: u64, token: Address) -> bool {
    APPROVAL_RESET_TOKENS.contains(&(chain_id, token))
}

pub async fn balance_of(
    chain: &dyn ChainReader,
    token: Address,
    owner: Address,
    block: BlockTag,
) -> Result<U256, AdapterError> {
    let call = Erc20Calls::BalanceOf(BalanceOfCall(owner));
    let data = ethers::contract::AbiEncode::encode(call);
    let raw = chain.eth_call(token, data.into(), block).await?;
    ethers::abi::AbiDecode::decode(raw.as_ref())
        .map_err(|e| AdapterError::Schema(format!("decoding balanceOf return: {e}")))
}

pub async fn decimals(chain: &dyn ChainReader, token: Address) -> Result<u8, AdapterError> {
    let call = Erc20Calls::Decimals(DecimalsCall);
    let data = ethers::contract::AbiEncode::encode(call);
    let raw = chain.eth_call(token, data.into(), BlockTag::Latest).await?;
    ethers::abi::AbiDecode::decode(raw.as_ref())
        .map_err(|e| AdapterError::Schema(format!("decoding decimals return: {e}")))
}

/// Falls back to a fixed-length `bytes32` decode for legacy tokens (e.g.
/// MKR) whose `symbol()`/`name()` are non-standard (spec §4.4).
pub async fn symbol(chain: &dyn ChainReader, token: Address) -> Result<String, AdapterError> {
    let call = Erc20Calls::Symbol(SymbolCall);
    let data = ethers::contract::AbiEncode::encode(call);
    let raw = chain.eth_call(token, data.into(), BlockTag::Latest).await?;
    if let Ok(s) = <String as ethers::abi::AbiDecode>::decode(raw.as_ref()) {
        return Ok(s);
    }
    decode_bytes32_string(raw.as_ref())
}

fn decode_bytes32_string(raw: &[u8]) -> Result<String, AdapterError> {
    if raw.len() < 32 {
        return Err(AdapterError::Schema("symbol/name return too short for bytes32 fallback".into()));
    }
    let trimmed: Vec<u8> = raw[..32].iter().copied().take_while(|&b| b != 0).collect();
    String::from_utf8(trimmed).map_err(|e| AdapterError::Schema(e.to_string()))
}

pub async fn allowance(
    chain: &dyn ChainReader,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, AdapterError> {
    let call = Erc20Calls::Allowance(AllowanceCall { owner, spender });
    let data = ethers::contract::AbiEncode::encode(call);
    let raw = chain.eth_call(token, data.into(), BlockTag::Latest).await?;
    ethers::abi::AbiDecode::decode(raw.as_ref())
        .map_err(|e| AdapterError::Schema(format!("decoding allowance return: {e}")))
}

fn approve_calldata(spender: Address, amount: U256) -> ethers::types::Bytes {
    let call = Erc20Calls::Approve(ApproveCall { spender, amount });
    ethers::contract::AbiEncode::encode(call).into()
}

/// Outcome of `ensure_allowance`: whether a broadcast was necessary, and the
/// hash(es) of whatever was sent, so a failed write can report partial
/// approval progress to the caller (spec §7: "the approval status (if any)
/// included in the payload").
#[derive(Debug, Clone, Default)]
pub struct AllowanceOutcome {
    pub reset_tx_hash: Option<ethers::types::H256>,
    pub approve_tx_hash: Option<ethers::types::H256>,
}

/// Idempotent guarantee that `allowance(owner, spender) >= need` (spec
/// §4.4, §8 invariant). Broadcasts at most two transactions: a
/// reset-to-zero and a set, only for tokens in the approval-reset set;
/// otherwise exactly one `approve`. Both broadcasts (when both happen)
/// await their receipts before returning.
pub async fn ensure_allowance(
    chain: &dyn ChainReader,
    pipeline: &TxPipeline,
    sender: &dyn TxSender,
    token: Address,
    owner: Address,
    spender: Address,
    need: U256,
    approve_to: U256,
) -> Result<AllowanceOutcome, AdapterError> {
    let current = allowance(chain, token, owner, spender).await?;
    if current >= need {
        return Ok(AllowanceOutcome::default());
    }

    let mut outcome = AllowanceOutcome::default();

    if requires_approval_reset(chain.chain_id(), token) {
        let reset_data = approve_calldata(spender, U256::zero());
        let reset_hash = pipeline.send_and_wait(chain, sender, token, reset_data, U256::zero()).await?;
        outcome.reset_tx_hash = Some(reset_hash);
    }

    let set_data = approve_calldata(spender, approve_to);
    let set_hash = pipeline.send_and_wait(chain, sender, token, set_data, U256::zero()).await?;
    outcome.approve_tx_hash = Some(set_hash);

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_reset_set_is_keyed_on_chain_and_token() {
        let usdt: Address = "0xdAC17F958D2ee523a2206206994597C13D831ec7".parse().unwrap();
        assert!(requires_approval_reset(1, usdt));
        assert!(!requires_approval_reset(42161, usdt));
    }

    #[test]
    fn decode_bytes32_string_trims_nul_padding() {
        let mut raw = [0u8; 32];
        raw[..3].copy_from_slice(b"DAI");
        assert_eq!(decode_bytes32_string(&raw).unwrap(), "DAI");
    }
}
