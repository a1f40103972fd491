//! Tunable constants for the adapter runtime, grouped the way
//! `chainflip-engine`'s `constants.rs` groups them by subsystem.

use std::time::Duration;

// ======= Rate math (spec §4.3) =======

pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Base of the rate-swap venue's tick encoding: `rate = sign(t) * (1.0001^(|t|*tick_step) - 1)`.
pub const TICK_BASE: f64 = 1.0001;

/// Default basis-point deviation tolerated while walking an orderbook for a
/// market-ish fill (spec §4.10).
pub const DEFAULT_MAX_IA_DEVIATION_BPS: u32 = 50;

// ======= Transaction pipeline (spec §4.5) =======

pub const GAS_BUFFER_MULTIPLIER_NUM: u64 = 11;
pub const GAS_BUFFER_MULTIPLIER_DEN: u64 = 10;

pub const SUGGESTED_PRIORITY_FEE_MULTIPLIER_NUM: u64 = 3;
pub const SUGGESTED_PRIORITY_FEE_MULTIPLIER_DEN: u64 = 2;

pub const MAX_BASE_FEE_GROWTH_MULTIPLIER: u64 = 2;

pub const SUGGESTED_GAS_PRICE_MULTIPLIER_NUM: u64 = 3;
pub const SUGGESTED_GAS_PRICE_MULTIPLIER_DEN: u64 = 2;

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(180);

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Nonce cache staleness bound, mirrors `engine/src/evm/rpc.rs::NONCE_LIFETIME`.
pub const NONCE_LIFETIME: Duration = Duration::from_secs(120);

// ======= Multicall read engine (spec §4.6) =======

pub const DEFAULT_MULTICALL_CHUNK_SIZE: usize = 300;

/// The canonical, chain-agnostic deployment address of Multicall3
/// (https://github.com/mds1/multicall), treated as an opaque descriptor.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

// ======= HTTP read client (spec §4.7) =======

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_HTTP_MAX_RETRIES: u32 = 3;

pub const HTTP_RETRY_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// The rate-swap API refuses page sizes above this; the client clamps to it.
pub const MAX_HTTP_PAGE_LIMIT: u32 = 100;

pub const DEFAULT_HTTP_PAGE_CAP: u32 = 200;

// ======= Rate-swap adapter (spec §4.10) =======

/// `marketId` value reserved for the cross-margin account in a packed
/// `marketAcc` (address‖accountId‖tokenId‖marketId).
pub const CROSS_MARGIN_SENTINEL: u32 = 0x00FF_FFFF;

/// Tick size used when walking the orderbook for fill selection; the venue's
/// `ia` buckets are quoted in bps regardless of this value.
pub const DEFAULT_ORDERBOOK_TICK_SIZE: f64 = 0.0001;

pub const DEFAULT_PLACE_ORDER_SLIPPAGE: f64 = 0.05;

/// Fallback withdrawal cooldown when the on-chain `getPersonalCooldown` read
/// fails; advisory only (spec §4.10 `withdrawal_status`).
pub const DEFAULT_WITHDRAWAL_COOLDOWN_SECONDS: u64 = 3600;

/// LayerZero endpoint ids for the HYPE OFT bridge (spec §4.10, §8 scenario 5).
pub const LZ_EID_ARBITRUM: u32 = 30110;
pub const LZ_EID_HYPEREVM: u32 = 30367;

pub const CHAIN_ID_HYPEREVM: u64 = 999;

// ======= Environment variable prefix for config loading =======

pub const CONFIG_ENV_PREFIX: &str = "WAYFINDER";
