//! `wayfinder_paths`: a unified runtime for reading canonical market/position
//! state and submitting writes across heterogeneous on-chain DeFi venues —
//! variable-rate lending pools and a fixed-rate orderbook venue — behind one
//! capability-typed adapter contract (spec §1).
//!
//! Grounded on `chainflip-engine`'s layering: a chain gateway at the bottom
//! (`chain`), a calldata codec and multicall batching above it (`codec`,
//! `multicall`), a transaction pipeline for writes (`tx`), and adapters on
//! top composing all of it (`adapters`). Configuration, logging, and errors
//! are ambient concerns threaded through every layer rather than bolted onto
//! any one of them.

pub mod adapter;
pub mod adapters;
pub mod chain;
pub mod codec;
pub mod config;
pub mod constants;
pub mod erc20;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod math;
pub mod multicall;
pub mod schema;
pub mod tx;

pub use adapter::{BorrowParams, ChainPositions, LendParams, ProtocolAdapter, SetCollateralParams, WriteReceipt};
pub use config::RuntimeConfig;
pub use error::{AdapterError, AdapterResult};
