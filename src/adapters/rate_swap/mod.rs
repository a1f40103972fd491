//! The fixed-rate orderbook venue adapter (spec §4.10, component C11).

pub mod adapter;
pub mod client;
pub mod types;

pub use adapter::{BridgeDirection, BridgeReceipt, ClosePositionOutcome, OftBridgeDeployment, RateSwapAdapter, RateSwapDeployment, TimeInForce};
pub use client::RateSwapClient;
