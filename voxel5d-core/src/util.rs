//! Numeric conversion utilities for voxel5d.
//!
//! These functions handle conversions between numeric types with explicit
//! handling of precision loss and bounds checking.

/// Convert usize to f64 with allowed precision loss.
#[must_use]
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn usize_to_f64(value: usize) -> f64 {
    value as f64
}

/// Convert i64 to f64 with allowed precision loss.
#[must_use]
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn i64_to_f64(value: i64) -> f64 {
    value as f64
}

/// Convert usize to i64, saturating at `i64::MAX`.
#[must_use]
#[inline]
pub fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Round f64 to the nearest i64, saturating at the i64 range (NaN maps to 0).
#[must_use]
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn round_to_i64(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    value.round() as i64
}

/// Convert f64 to u8 with rounding and clamping to [0, 255].
#[must_use]
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f64_to_u8(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0).round() as u8
}

/// Convert f64 to an index clamped into `[0, len - 1]` by truncation.
///
/// Returns 0 for an empty range or a NaN value.
#[must_use]
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f64_to_index_clamped(value: f64, len: usize) -> usize {
    if len == 0 || value.is_nan() || value <= 0.0 {
        return 0;
    }
    let top = len - 1;
    if value >= usize_to_f64(top) {
        top
    } else {
        value as usize
    }
}

/// Convert f64 to usize with bounds checking.
///
/// Returns `None` if the value is not finite, negative, or >= `max_exclusive`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn f64_to_usize_bounded(value: f64, max_exclusive: usize) -> Option<usize> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value >= usize_to_f64(max_exclusive) {
        return None;
    }
    Some(value as usize)
}

/// Clamp a signed coordinate into `[0, len - 1]`.
#[must_use]
#[inline]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn clamp_coord(value: i64, len: usize) -> usize {
    if value <= 0 || len == 0 {
        return 0;
    }
    let top = usize_to_i64(len - 1);
    value.min(top) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_to_u8_clamps() {
        assert_eq!(f64_to_u8(-3.0), 0);
        assert_eq!(f64_to_u8(254.6), 255);
        assert_eq!(f64_to_u8(1e9), 255);
        assert_eq!(f64_to_u8(f64::NAN), 0);
    }

    #[test]
    fn test_index_clamped() {
        assert_eq!(f64_to_index_clamped(-1.0, 256), 0);
        assert_eq!(f64_to_index_clamped(12.9, 256), 12);
        assert_eq!(f64_to_index_clamped(1e6, 256), 255);
        assert_eq!(f64_to_index_clamped(3.0, 0), 0);
    }

    #[test]
    fn test_usize_bounded() {
        assert_eq!(f64_to_usize_bounded(2.5, 3), Some(2));
        assert_eq!(f64_to_usize_bounded(3.0, 3), None);
        assert_eq!(f64_to_usize_bounded(-0.5, 3), None);
        assert_eq!(f64_to_usize_bounded(f64::INFINITY, 3), None);
    }

    #[test]
    fn test_clamp_coord() {
        assert_eq!(clamp_coord(-5, 4), 0);
        assert_eq!(clamp_coord(2, 4), 2);
        assert_eq!(clamp_coord(9, 4), 3);
    }
}
