//! Miscellaneous utility functions.

/// Values closer together than this are treated as equal.
const EPSILON: f64 = 1e-9;

/// The arithmetic mean of the values, or zero if there are none.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// The population standard deviation of the values, or zero if there are none.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Whether two values are equal up to a relative tolerance.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON * f64::max(1.0, f64::max(a.abs(), b.abs()))
}

/// Whether the value is close enough to zero to be considered zero.
pub fn is_near_zero(value: f64) -> bool {
    value.abs() <= 1e-8
}

/// Divides `num` by `den`, treating the ratio as 1 when the denominator isn't positive.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        1.0
    }
}

/// Picks whichever of the two ratios is closer to 1, preferring the first on a tie.
pub fn closest_to_one(a: f64, b: f64) -> f64 {
    if (b - 1.0).abs() < (a - 1.0).abs() {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn summary_statistics() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_approx_eq!(mean(&[2.0, 4.0, 9.0]), 5.0);
        assert_approx_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
    }

    #[test]
    fn ratios() {
        assert_eq!(ratio(3.0, 0.0), 1.0);
        assert_eq!(ratio(3.0, -1.0), 1.0);
        assert_approx_eq!(ratio(3.0, 4.0), 0.75);
        assert_eq!(closest_to_one(0.9, 1.5), 0.9);
        assert_eq!(closest_to_one(0.5, 1.2), 1.2);
    }

    #[test]
    fn tolerant_equality() {
        let third = 1.0 / 3.0;
        assert!(approx_eq(0.6 * third + 0.4 * third, third));
        assert!(!approx_eq(1.0, 1.001));
        assert!(is_near_zero(1e-12));
        assert!(!is_near_zero(1e-3));
    }
}
