//! Chain Gateway (spec §4.1, component C1).

pub mod gateway;
pub mod pool;

pub use gateway::{BlockTag, ChainReader, EvmChainGateway};
pub use pool::ChainGatewayPool;

#[cfg(test)]
pub use gateway::MockChainReader;
