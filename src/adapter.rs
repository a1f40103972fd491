//! Adapter Contract (spec §4.8, component C9).
//!
//! Grounded on `other_examples/a5f0d372_…adapters-traits.rs`'s `DeFiAdapter`
//! trait, generalized to the capability set spec §4.8 lists. Every method
//! returns `AdapterResult<T>`; an operation a protocol does not offer
//! returns `AdapterError::Unsupported` rather than being absent from the
//! trait (spec §4.8: "Unsupported operations return … — they are not
//! absent").

use async_trait::async_trait;
use ethers::types::{Address, U256};

use crate::{
    error::AdapterResult,
    schema::{LendingMarket, Position, UserState},
};

/// Parameters common to every state-changing lending-pool call (spec §4.9).
///
/// `full`, when set, tells the pool to compute the exact amount itself
/// (`U256::MAX` withdraw/repay, Aave's own "withdraw all"/"repay all"
/// convention) instead of trusting a caller-estimated `amount`; `amount` is
/// then ignored.
#[derive(Debug, Clone)]
pub struct LendParams {
    pub chain_id: u64,
    pub underlying: Address,
    pub amount: U256,
    pub native: bool,
    pub full: bool,
}

#[derive(Debug, Clone)]
pub struct BorrowParams {
    pub chain_id: u64,
    pub underlying: Address,
    pub amount: U256,
    pub native: bool,
    pub full: bool,
}

#[derive(Debug, Clone)]
pub struct SetCollateralParams {
    pub chain_id: u64,
    pub underlying: Address,
    pub use_as_collateral: bool,
}

/// Outcome of a state-changing write (spec §7: "a failed write returns …
/// with the approval status (if any) included in the payload").
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub tx_hash: ethers::types::H256,
    pub approval_tx_hash: Option<ethers::types::H256>,
}

/// The capability-typed protocol adapter interface (spec §4.8). Adapters
/// implement the subset of operations their protocol actually offers;
/// everything else returns `AdapterError::Unsupported`.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Name used in `AdapterError::Unsupported { adapter, .. }` diagnostics.
    fn name(&self) -> &'static str;

    async fn get_all_markets(&self, chain_id: u64, include_rewards: bool) -> AdapterResult<Vec<LendingMarket>>;

    async fn get_full_user_state(&self, account: Address, include_zero_positions: bool) -> AdapterResult<UserState>;

    async fn lend(&self, params: LendParams) -> AdapterResult<WriteReceipt>;

    async fn unlend(&self, params: LendParams) -> AdapterResult<WriteReceipt>;

    async fn borrow(&self, params: BorrowParams) -> AdapterResult<WriteReceipt>;

    async fn repay(&self, params: BorrowParams) -> AdapterResult<WriteReceipt>;

    async fn set_collateral(&self, params: SetCollateralParams) -> AdapterResult<WriteReceipt>;

    async fn claim_rewards(&self, chain_id: u64, assets: Option<Vec<Address>>) -> AdapterResult<WriteReceipt>;
}

/// Positions belonging to a single protocol/chain, returned by adapters
/// that expose per-market reads independent of the full aggregated
/// `UserState` (used internally by `get_full_user_state` fan-out).
#[derive(Debug, Clone, Default)]
pub struct ChainPositions {
    pub chain_id: u64,
    pub positions: Vec<Position>,
    /// Per-user claimable-reward rows sourced from `getUserReservesIncentivesData`,
    /// folded into `UserState.rewards` by the caller (spec §3 `UserState.rewards`).
    pub rewards: Option<serde_json::Value>,
}

/// Default `Unsupported` helper for adapters implementing only a subset of
/// the capability set; call sites use this instead of duplicating the
/// `AdapterError::Unsupported` construction.
pub fn unsupported<T>(adapter: &'static str, operation: &'static str) -> AdapterResult<T> {
    Err(crate::error::AdapterError::unsupported(adapter, operation))
}
