//! Rational curve warp shared by the envelope generators.

/// Warp `x` in [0, 1] with curvature `k` in (-1, 1).
///
/// `k < 0` bends the ramp towards a fast start (logarithmic feel), `k > 0`
/// towards a slow start (exponential feel). Falls back to identity when `k` is
/// zero or the denominator collapses (including NaN).
#[inline]
pub fn apply_curve(x: f32, k: f32) -> f32 {
    if k == 0.0 {
        return x;
    }
    let denominator = k - 2.0 * k * x.abs() + 1.0;
    if denominator.is_nan() || denominator.abs() < 1e-6 {
        return x;
    }
    (x - k * x) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_endpoints() {
        for &k in &[-0.99, -0.5, -0.1, 0.0, 0.1, 0.5, 0.99] {
            assert_relative_eq!(apply_curve(0.0, k), 0.0);
            assert_relative_eq!(apply_curve(1.0, k), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_curve_is_identity() {
        for i in 0..=100 {
            let x = i as f32 / 100.0;
            assert_eq!(apply_curve(x, 0.0), x);
        }
    }

    #[test]
    fn test_curve_bends_in_expected_direction() {
        assert!(apply_curve(0.5, 0.8) < 0.5);
        assert!(apply_curve(0.5, -0.8) > 0.5);
    }

    #[test]
    fn test_monotonic() {
        for &k in &[-0.9, -0.3, 0.3, 0.9] {
            let mut last = 0.0;
            for i in 1..=1000 {
                let y = apply_curve(i as f32 / 1000.0, k);
                assert!(y >= last, "k={} not monotonic at {}", k, i);
                last = y;
            }
        }
    }

    #[test]
    fn test_degenerate_denominator_falls_back_to_identity() {
        // k = -1 at x = 0 gives a zero denominator
        assert_eq!(apply_curve(0.0, -1.0), 0.0);
        // k = 1 at x = 1 as well
        assert_eq!(apply_curve(1.0, 1.0), 1.0);
        assert_eq!(apply_curve(0.3, f32::NAN), 0.3);
    }
}
