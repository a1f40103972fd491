//! Protocol adapters (spec §4.9, §4.10 — the two exemplars this crate
//! implements against the Adapter Contract in `crate::adapter`).

pub mod lending_pool;
pub mod rate_swap;
