//! Wire shapes for the fixed-rate orderbook venue's HTTP API (spec §4.10).
//!
//! Per spec §9 ("Dynamic payloads from HTTP APIs"): known fields get explicit
//! schemas, unknown top-level shape is rejected as `AdapterError::Schema`
//! rather than silently defaulting to zero. The raw order-book/collateral
//! payloads are kept as plain structs rather than re-derived canonical types,
//! since they are intermediate data the adapter consumes, not `schema::*`
//! values returned to callers.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// One page of `/markets`. `data` carries whatever price snapshot the venue
/// embedded; its absence just means the caller must fetch the order book.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSnapshot {
    #[serde(alias = "id")]
    pub market_id: u32,
    #[serde(default, alias = "marketAddress")]
    pub address: Option<Address>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub underlying: Option<Address>,
    #[serde(default, alias = "tokenId")]
    pub collateral_token_id: Option<u16>,
    #[serde(default, rename = "imData")]
    pub im_data: Option<ImData>,
    #[serde(default, rename = "maturityTs")]
    pub maturity_ts: Option<u64>,
    #[serde(default)]
    pub data: Option<MarketDataSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImData {
    #[serde(rename = "tickStep")]
    pub tick_step: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDataSnapshot {
    #[serde(rename = "bestBid")]
    pub best_bid: Option<f64>,
    #[serde(rename = "bestAsk")]
    pub best_ask: Option<f64>,
    #[serde(rename = "midApr")]
    pub mid_apr: Option<f64>,
    #[serde(rename = "markApr")]
    pub mark_apr: Option<f64>,
    #[serde(rename = "floatingApr")]
    pub floating_apr: Option<f64>,
    #[serde(rename = "volume24h")]
    pub volume_24h: Option<f64>,
    #[serde(rename = "notionalOI")]
    pub notional_oi: Option<f64>,
}

/// One side of an order book: parallel `ia` (implied APR, bps) and `sz`
/// (size, wei-as-decimal-string) arrays, per spec §4.10.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookSide {
    #[serde(default)]
    pub ia: Vec<i64>,
    #[serde(default)]
    pub sz: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookSnapshot {
    #[serde(default)]
    pub long: OrderbookSide,
    #[serde(default)]
    pub short: OrderbookSide,
}

/// A single collateral row from `/collaterals/summary`.
#[derive(Debug, Clone, Deserialize)]
pub struct CollateralRow {
    #[serde(rename = "tokenId")]
    pub token_id: u16,
    #[serde(default)]
    pub withdrawal: WithdrawalRow,
    #[serde(default, rename = "crossPosition")]
    pub cross_position: Option<CrossPosition>,
    #[serde(default, rename = "isolatedPositions")]
    pub isolated_positions: Vec<IsolatedCollateralRow>,
}

/// One per-market isolated-cash row nested under a `CollateralRow` (spec
/// §4.10 "Deposit → cross margin").
#[derive(Debug, Clone, Deserialize)]
pub struct IsolatedCollateralRow {
    #[serde(default, rename = "marketAcc")]
    pub market_acc: Option<String>,
    #[serde(default, rename = "availableBalance")]
    pub available_balance: Option<String>,
    #[serde(default, rename = "netBalance")]
    pub net_balance: Option<String>,
    #[serde(default, rename = "marketPositions")]
    pub market_positions: Vec<MarketPositionRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WithdrawalRow {
    #[serde(default, rename = "lastWithdrawalAmount")]
    pub last_withdrawal_amount: String,
    #[serde(default, rename = "lastWithdrawalRequestTime")]
    pub last_withdrawal_request_time: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossPosition {
    #[serde(rename = "marketAcc")]
    pub market_acc: Option<String>,
    #[serde(default, rename = "marketPositions")]
    pub market_positions: Vec<MarketPositionRow>,
}

/// One open position nested under a cross or isolated collateral row. A
/// zero (or absent) `size_wei` means no open position, matching the venue's
/// behavior of returning closed markets as zero-size rows rather than
/// omitting them (spec §4.10 `close_positions_market`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketPositionRow {
    #[serde(default, rename = "marketId")]
    pub market_id: Option<u32>,
    #[serde(default)]
    pub side: Option<u8>,
    #[serde(default, rename = "sizeWei", alias = "notionalSize", alias = "size")]
    pub size_wei: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollateralsResponse {
    #[serde(default)]
    pub collaterals: Vec<CollateralRow>,
}

/// Withdrawal cooldown progress, as returned to callers (spec §4.10
/// `withdrawal_status`).
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalStatus {
    pub amount_native: u128,
    pub request_time: u64,
    pub elapsed_seconds: u64,
    pub cooldown_seconds: u64,
    pub cooldown_source: &'static str,
    pub can_finalize: bool,
    pub wait_seconds: Option<u64>,
}

/// One open position, derived from a `CollateralsResponse`'s cross and
/// isolated `marketPositions` rows rather than decoded directly — the venue
/// has no dedicated "active positions" endpoint (spec §4.10
/// `close_positions_market`).
#[derive(Debug, Clone)]
pub struct ActivePosition {
    pub market_id: u32,
    pub side: u8,
    pub size_wei: ethers::types::I256,
    pub is_cross: bool,
}

/// The upstream calldata envelope: either a direct `{to, data, value}`
/// transaction or a `{calldatas: [...]}` batch targeting the protocol router
/// (spec §4.10 "Calldata broadcasting").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalldataEnvelope {
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub calldatas: Option<Vec<String>>,
    #[serde(default)]
    pub spender: Option<Address>,
}

/// One row of `/core/v1/pnl/limit-orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLimitOrder {
    #[serde(default, rename = "orderId", alias = "id")]
    pub order_id: Option<String>,
    #[serde(default, rename = "marketId")]
    pub market_id: Option<u32>,
    #[serde(default)]
    pub side: Option<u8>,
    #[serde(default, rename = "limitTick")]
    pub limit_tick: Option<i64>,
    #[serde(default, rename = "tickStep")]
    pub tick_step: Option<i64>,
    #[serde(default, rename = "size")]
    pub size_wei: Option<String>,
    #[serde(default, rename = "filledSize")]
    pub filled_size_wei: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Response envelope for `/core/v1/pnl/limit-orders`: the venue returns
/// either `orders` or `results` depending on endpoint version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenOrdersResponse {
    #[serde(default, alias = "results")]
    pub orders: Vec<RawLimitOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_orders_response_accepts_results_alias() {
        let json = serde_json::json!({"results": [{"orderId": "1", "marketId": 3, "side": 0}]});
        let resp: OpenOrdersResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.orders.len(), 1);
        assert_eq!(resp.orders[0].order_id.as_deref(), Some("1"));
    }

    #[test]
    fn market_snapshot_accepts_id_alias() {
        let json = serde_json::json!({"id": 7, "symbol": "USDC-DEC26"});
        let snap: MarketSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snap.market_id, 7);
        assert_eq!(snap.symbol.as_deref(), Some("USDC-DEC26"));
    }

    #[test]
    fn calldatas_batch_shape_parses() {
        let json = serde_json::json!({"calldatas": ["0x01", "0x02"]});
        let env: CalldataEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(env.calldatas.unwrap().len(), 2);
    }
}
