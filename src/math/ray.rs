//! RAY fixed-point math and APR↔APY conversion (spec §3, §4.3, §8 scenario 1).
//!
//! Built fresh in the teacher's numeric idiom: raw on-chain quantities stay
//! in `U256` as long as possible (spec §9 "Integer math"), converting to
//! `f64` only at the point a human- or USD-facing number is produced.

use ethers::types::U256;

use crate::constants::SECONDS_PER_YEAR;

/// `RAY = 10^27`, the fixed-point unit Aave-v3-style pools use for rates and
/// indexes.
pub fn ray() -> U256 {
    U256::exp10(27)
}

/// `apr_from_ray(x) = x / RAY`, as a decimal fraction (e.g. `0.05` for 5%).
pub fn apr_from_ray(x: U256) -> f64 {
    // RAY (1e27) exceeds f64's exact-integer range, so divide in fixed point
    // first and only fall to f64 for the final, much smaller, quotient.
    let ray = ray();
    let whole = x / ray;
    let remainder = x % ray;
    whole.as_u128() as f64 + (u256_to_f64_lossy(remainder) / u256_to_f64_lossy(ray))
}

fn u256_to_f64_lossy(x: U256) -> f64 {
    let mut result = 0f64;
    for word in x.0.iter().rev() {
        result = result * 2f64.powi(64) + (*word as f64);
    }
    result
}

/// `apy = (1 + apr/SECONDS_PER_YEAR)^SECONDS_PER_YEAR - 1`, the
/// per-second-compounded yield for a given simple annual rate.
pub fn apy_from_apr(apr: f64) -> f64 {
    (1.0 + apr / SECONDS_PER_YEAR).powf(SECONDS_PER_YEAR) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apr_from_ray_five_percent() {
        let five_percent_ray = ray() / U256::from(20u64);
        let apr = apr_from_ray(five_percent_ray);
        assert!((apr - 0.05).abs() < 1e-9, "apr = {apr}");
    }

    #[test]
    fn apy_tracks_continuous_compounding() {
        let apy = apy_from_apr(0.05);
        assert!((apy - 0.0512_67).abs() < 1e-3, "apy = {apy}");
    }

    #[test]
    fn zero_apr_gives_zero_apy() {
        assert_eq!(apy_from_apr(0.0), 0.0);
    }
}
