//! Supply-cap headroom (spec §3, §8 scenario 2).

use ethers::types::U256;

/// `supply_cap_headroom = max(0, supply_cap*10^decimals - (available_liquidity + variable_debt))`
/// when `supply_cap > 0`, else `None`.
///
/// `variable_debt` here is the already-computed `(scaledVariableDebt *
/// variableBorrowIndex) / RAY` underlying amount, not the scaled balance.
pub fn supply_cap_headroom(
    supply_cap: U256,
    decimals: u32,
    available_liquidity: U256,
    variable_debt: U256,
) -> Option<U256> {
    if supply_cap.is_zero() {
        return None;
    }
    let cap_raw = supply_cap.saturating_mul(U256::exp10(decimals as usize));
    let total_supplied = available_liquidity.saturating_add(variable_debt);
    Some(cap_raw.saturating_sub(total_supplied))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_two_supply_cap_headroom() {
        let headroom = supply_cap_headroom(
            U256::from(100u64),
            6,
            U256::from(10_000_000u64),
            U256::from(5_000_000u64),
        );
        assert_eq!(headroom, Some(U256::from(85_000_000u64)));
    }

    #[test]
    fn zero_cap_is_absent() {
        assert_eq!(
            supply_cap_headroom(U256::zero(), 6, U256::from(1u64), U256::from(1u64)),
            None
        );
    }

    #[test]
    fn headroom_clamps_to_zero_when_over_cap() {
        let headroom = supply_cap_headroom(
            U256::from(1u64),
            6,
            U256::from(2_000_000u64),
            U256::from(0u64),
        );
        assert_eq!(headroom, Some(U256::zero()));
    }

    #[test]
    fn invariant_headroom_plus_total_equals_cap() {
        let cap = U256::from(100u64);
        let decimals = 6u32;
        let available = U256::from(10_000_000u64);
        let debt = U256::from(5_000_000u64);
        let headroom = supply_cap_headroom(cap, decimals, available, debt).unwrap();
        let cap_raw = cap * U256::exp10(decimals as usize);
        assert_eq!(headroom + (available + debt), cap_raw);
    }
}
