//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Fractional position of `value` between `lower` and `upper`.
///
/// Returns 0 at `lower` and 1 at `upper`. `lower` and `upper` must differ.
pub fn ratio<T>(lower: T, upper: T, value: T) -> T
where
    T: Float
{
    (value - lower) / (upper - lower)
}

/// Linearly interpolate between `a` and `b` by `ratio`.
pub fn lerp<T>(a: T, b: T, ratio: T) -> T
where
    T: Float
{
    a + ratio * (b - a)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 1f64), (0f64, 40_000f64), 0.25), 10_000f64);
        assert_eq!(lin_map((100f64, 200f64), (1f64, 3f64), 150f64), 2f64);
        assert_eq!(lin_map((0f64, 1f64), (10f64, 20f64), 0f64), 10f64);
    }

    #[test]
    fn test_ratio_lerp() {
        assert_eq!(ratio(100f64, 200f64, 150f64), 0.5);
        assert_eq!(ratio(100f64, 200f64, 100f64), 0.0);
        assert_eq!(lerp(0.002f64, 0.004f64, 0.5), 0.003);
        assert_eq!(lerp(0.35f64, 0.30f64, 0.0), 0.35);
        assert_eq!(lerp(0.35f64, 0.30f64, 1.0), 0.30);
    }
}
