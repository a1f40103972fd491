//! Tick ↔ APR conversion for the fixed-rate orderbook venue (spec §4.3,
//! §4.10, §8 scenarios 3–4).
//!
//! `rate = sign(t) * (1.0001^(|t| * tick_step) - 1)`. The inverse rounds
//! toward zero for the short side and away from zero for the long side, so
//! that a derived limit tick always crosses the spread rather than missing
//! it by a rounding error (spec §4.3).

use crate::constants::TICK_BASE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

/// Coerces a non-positive tick step to 1, per spec §4.3.
pub fn normalize_tick_step(tick_step: i64) -> i64 {
    if tick_step <= 0 {
        1
    } else {
        tick_step
    }
}

/// `rate_from_tick(t, tick_step)`.
pub fn rate_from_tick(tick: i64, tick_step: i64) -> f64 {
    let tick_step = normalize_tick_step(tick_step);
    let sign = if tick < 0 { -1.0 } else { 1.0 };
    let exponent = (tick.unsigned_abs() as i64) * tick_step;
    sign * (TICK_BASE.powi(exponent as i32) - 1.0)
}

/// `tick_from_rate(r, tick_step, side)`: the limit tick that crosses the
/// spread for the given side. `round_down` callers should pass
/// `Side::Short`; `round_up` (away from zero) callers should pass
/// `Side::Long`, matching spec §4.3's rounding-direction table.
pub fn tick_from_rate(rate: f64, tick_step: i64, side: Side) -> i64 {
    let tick_step = normalize_tick_step(tick_step);
    let sign = if rate < 0.0 { -1.0 } else { 1.0 };
    let magnitude = (1.0 + rate.abs()).ln() / TICK_BASE.ln();
    let raw_ticks = magnitude / tick_step as f64;
    let rounded = match side {
        Side::Short => raw_ticks.floor(),
        Side::Long => raw_ticks.ceil(),
    };
    (sign * rounded) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_tolerance() {
        let r = 0.10;
        let t = tick_from_rate(r, 1, Side::Long);
        let back = rate_from_tick(t, 1);
        assert!((back - r).abs() < 1e-3, "back = {back}");
    }

    #[test]
    fn non_positive_tick_step_coerced_to_one() {
        assert_eq!(normalize_tick_step(0), 1);
        assert_eq!(normalize_tick_step(-5), 1);
        assert_eq!(normalize_tick_step(3), 3);
    }

    #[test]
    fn scenario_three_tick_math_round_trip() {
        // spec §8 scenario 3: r=0.10, tick_step=1, round_down=false (long side).
        let t = tick_from_rate(0.10, 1, Side::Long);
        let back = rate_from_tick(t, 1);
        assert!((back - 0.10).abs() < 1e-3);
    }

    #[test]
    fn short_side_rounds_toward_zero() {
        // A tiny positive rate should floor to tick 0 for the short side,
        // since rounding toward zero on a sub-tick rate yields zero ticks.
        let t = tick_from_rate(0.0000001, 1, Side::Short);
        assert_eq!(t, 0);
    }

    #[test]
    fn negative_rate_preserves_sign() {
        let t = tick_from_rate(-0.05, 1, Side::Long);
        assert!(t < 0);
        let back = rate_from_tick(t, 1);
        assert!(back < 0.0);
    }
}
