//! Waveshaping helpers
//!
//! Stateless transfer functions shared by the oscillator and effect modules.

use libm::Libm;

/// Hyperbolic tangent saturation normalised so that `x = ±1` maps to `±1`.
///
/// Higher drive adds harmonics without changing the peak level.
#[inline]
pub fn tanh_sat(x: f32, drive: f32) -> f32 {
    let denominator = Libm::<f32>::tanh(drive).max(0.001);
    Libm::<f32>::tanh(x * drive) / denominator
}

/// Soft clipping with adjustable knee.
///
/// Below `threshold` the signal passes unchanged; above it the excess is
/// compressed towards `threshold + 1`.
#[inline]
pub fn soft_clip(x: f32, threshold: f32) -> f32 {
    if x.abs() < threshold {
        x
    } else {
        let excess = x.abs() - threshold;
        x.signum() * (threshold + excess / (1.0 + excess))
    }
}

/// Triangle wavefolder.
///
/// Anything beyond `±threshold` is reflected back into range as many times as
/// needed, so the output always lies within `±threshold`. A non-positive
/// threshold folds everything to zero.
#[inline]
pub fn fold(x: f32, threshold: f32) -> f32 {
    if !(threshold > 0.0) || !x.is_finite() {
        return 0.0;
    }
    let period = 4.0 * threshold;
    threshold - ((x + threshold).rem_euclid(period) - 2.0 * threshold).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tanh_sat_normalised() {
        assert_relative_eq!(tanh_sat(1.0, 3.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(tanh_sat(-1.0, 3.0), -1.0, epsilon = 1e-6);
        assert_relative_eq!(tanh_sat(0.0, 3.0), 0.0);
        // compresses the middle upwards
        assert!(tanh_sat(0.5, 3.0) > 0.5);
    }

    #[test]
    fn test_soft_clip() {
        assert_eq!(soft_clip(0.5, 1.0), 0.5);
        assert_relative_eq!(soft_clip(2.0, 1.0), 1.5);
        assert_relative_eq!(soft_clip(-2.0, 1.0), -1.5);
        assert!(soft_clip(1000.0, 1.0) < 2.0);
    }

    #[test]
    fn test_fold_identity_inside_threshold() {
        for &x in &[-0.9, -0.3, 0.0, 0.4, 1.0] {
            assert_relative_eq!(fold(x, 1.0), x, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fold_reflects() {
        assert_relative_eq!(fold(1.5, 1.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(fold(-1.5, 1.0), -0.5, epsilon = 1e-6);
        assert_relative_eq!(fold(3.0, 1.0), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fold_always_bounded() {
        for i in -1000..1000 {
            let x = i as f32 * 0.037;
            let y = fold(x, 0.8);
            assert!(y.abs() <= 0.8 + 1e-5, "fold({}) = {}", x, y);
        }
        assert_eq!(fold(5.0, 0.0), 0.0);
        assert_eq!(fold(f32::NAN, 1.0), 0.0);
    }
}
