//! `normalize_apr`: classifies a raw numeric APR encoding into a decimal
//! fraction (spec §4.3, §8 invariants).

/// Classifies `x` into one of four encodings and returns the decimal
/// fraction: `None`/`0 -> None`; `|x| > 1e9 -> x/1e18` (18-scaled);
/// `|x| > 1000 -> x/10_000` (basis points); `|x| > 1 -> x/100` (percent);
/// otherwise `x` is already decimal.
pub fn normalize_apr(x: Option<f64>) -> Option<f64> {
    let x = x?;
    if x == 0.0 {
        return None;
    }
    let abs = x.abs();
    let normalized = if abs > 1e9 {
        x / 1e18
    } else if abs > 1000.0 {
        x / 10_000.0
    } else if abs > 1.0 {
        x / 100.0
    } else {
        x
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_and_zero_map_to_none() {
        assert_eq!(normalize_apr(None), None);
        assert_eq!(normalize_apr(Some(0.0)), None);
    }

    #[test]
    fn eighteen_scaled_round_trips() {
        for x in [0.0001, 0.01, 0.5, 0.9999] {
            let scaled = x * 1e18;
            let got = normalize_apr(Some(scaled)).unwrap();
            assert!((got - x).abs() < 1e-9, "x={x} got={got}");
        }
    }

    #[test]
    fn basis_points_round_trip() {
        for x in [0.11, 0.5, 0.9999] {
            let scaled = x * 1e4;
            let got = normalize_apr(Some(scaled)).unwrap();
            assert!((got - x).abs() < 1e-9, "x={x} got={got}");
        }
    }

    #[test]
    fn percent_round_trips() {
        for x in [0.02, 0.5, 0.99] {
            let scaled = x * 1e2;
            let got = normalize_apr(Some(scaled)).unwrap();
            assert!((got - x).abs() < 1e-9, "x={x} got={got}");
        }
    }

    #[test]
    fn already_decimal_passes_through() {
        assert_eq!(normalize_apr(Some(0.05)), Some(0.05));
    }
}
