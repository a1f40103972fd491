//! Canonical Schema (spec §3, §4.8, component C8).
//!
//! Grounded on `other_examples/a5f0d372_…adapters-traits.rs`'s typed
//! position/market structs, generalized to the field lists spec §3
//! specifies verbatim. `serde` derives let these types cross an MCP/IPC
//! boundary even though that transport is itself out of scope here.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Which side of a market a position or incentive applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSide {
    Supply,
    Borrow,
}

/// Lending-pool reserve flags (spec §3). A named struct rather than a
/// bitfield, matching the corpus's preference for named booleans over
/// bit-packed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReserveFlags {
    pub active: bool,
    pub frozen: bool,
    pub paused: bool,
    pub siloed: bool,
    pub stable: bool,
    pub collateral_enabled: bool,
    pub borrowing_enabled: bool,
}

/// One reward stream on a lending-pool reserve (spec §3 "Incentive row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incentive {
    pub side: MarketSide,
    pub token: Address,
    pub symbol: String,
    pub apr: f64,
    pub emission_per_second: U256,
    pub distribution_end: Option<u64>,
    pub price_usd: f64,
}

/// A single lending-pool reserve in canonical form (spec §3 "Market
/// (lending)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingMarket {
    pub chain_id: u64,
    pub pool: Address,
    pub underlying: Address,
    pub symbol_canonical: String,
    pub decimals: u8,
    pub a_token: Address,
    pub variable_debt_token: Address,
    pub ltv_bps: u32,
    pub liquidation_threshold_bps: u32,
    pub price_usd: f64,
    pub supply_apr: f64,
    pub supply_apy: f64,
    pub variable_borrow_apr: f64,
    pub variable_borrow_apy: f64,
    pub available_liquidity: U256,
    pub total_variable_debt: U256,
    pub tvl: U256,
    pub supply_cap: U256,
    pub supply_cap_headroom: Option<U256>,
    pub borrow_cap: U256,
    pub flags: ReserveFlags,
    pub incentives: Vec<Incentive>,
}

/// A fixed-rate orderbook market in canonical form (spec §3 "Market
/// (rate-swap)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSwapMarket {
    pub market_id: u32,
    pub address: Address,
    pub symbol: String,
    pub underlying: Address,
    pub collateral_token_id: u16,
    pub tick_step: i64,
    pub maturity_ts: u64,
    pub tenor_days: u32,
    pub mid_apr: Option<f64>,
    pub best_bid_apr: Option<f64>,
    pub best_ask_apr: Option<f64>,
    pub mark_apr: Option<f64>,
    pub floating_apr: Option<f64>,
    pub volume_24h: Option<f64>,
    pub notional_oi: Option<f64>,
}

/// A single user position in one protocol/chain/underlying (spec §3
/// "Position"). Invariant: at most one of `share_or_balance_raw`/`debt_raw`
/// is non-zero for protocols that enforce exclusivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub chain_id: u64,
    pub protocol: String,
    pub underlying: Address,
    pub decimals: u8,
    pub share_or_balance_raw: U256,
    pub debt_raw: U256,
    pub usage_as_collateral: bool,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub reward_supply_apr: f64,
    pub reward_borrow_apr: f64,
    pub price_usd: f64,
    pub usd_value: Option<f64>,
}

/// Aggregated user state across every chain an adapter supports (spec §3
/// "UserState"). `chains` records which chains were *successfully* queried;
/// positions from failed chains are absent, never partial.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserState {
    pub protocol: String,
    pub account: Address,
    pub chains: Vec<u64>,
    pub positions: Vec<Position>,
    pub errors: Vec<String>,
    pub rewards: Option<serde_json::Value>,
    pub queued_withdrawals: Option<serde_json::Value>,
}

impl UserState {
    pub fn new(protocol: impl Into<String>, account: Address) -> Self {
        Self { protocol: protocol.into(), account, ..Default::default() }
    }
}

/// Order side on the rate-swap venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

/// A resting or partially-filled limit order on the rate-swap venue (spec
/// §3 "LimitOrder"). Invariant: `remaining_size = size - filled_size >= 0`;
/// `limit_apr = rate_from_tick(limit_tick, tick_step)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrder {
    pub order_id: String,
    pub market_id: u32,
    pub side: OrderSide,
    pub size: U256,
    pub limit_tick: i64,
    pub limit_apr: f64,
    pub filled_size: U256,
    pub remaining_size: U256,
    pub status: OrderStatus,
}

/// A quote for a market-ish fill, produced by orderbook tick selection
/// (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub market_id: u32,
    pub side: OrderSide,
    pub size: U256,
    pub chosen_rate: f64,
    pub limit_tick: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_state_defaults_to_empty() {
        let state = UserState::new("lending-pool", Address::zero());
        assert!(state.positions.is_empty());
        assert!(state.errors.is_empty());
        assert!(state.chains.is_empty());
    }

    #[test]
    fn limit_order_remaining_size_invariant() {
        let order = LimitOrder {
            order_id: "1".into(),
            market_id: 1,
            side: OrderSide::Long,
            size: U256::from(100u64),
            limit_tick: 10,
            limit_apr: 0.05,
            filled_size: U256::from(40u64),
            remaining_size: U256::from(60u64),
            status: OrderStatus::PartiallyFilled,
        };
        assert_eq!(order.remaining_size, order.size - order.filled_size);
    }
}
