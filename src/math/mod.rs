//! Rate/interest math kernel (spec §4.3, component C3).

pub mod normalize;
pub mod ray;
pub mod supply_cap;
pub mod tick;

pub use normalize::normalize_apr;
pub use ray::{apr_from_ray, apy_from_apr, ray};
pub use supply_cap::supply_cap_headroom;
pub use tick::{normalize_tick_step, rate_from_tick, tick_from_rate, Side};
