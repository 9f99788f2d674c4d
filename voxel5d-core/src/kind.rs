//! Storage kinds and complex read modes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scalar storage kind of a voxel volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 32-bit.
    I32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Pair of 32-bit floats (real, imaginary).
    Complex64,
}

impl ValueKind {
    /// All kinds in declaration order.
    pub const ALL: [ValueKind; 6] = [
        ValueKind::U8,
        ValueKind::U16,
        ValueKind::I32,
        ValueKind::F32,
        ValueKind::F64,
        ValueKind::Complex64,
    ];

    /// Smallest raw value the kind can store.
    #[must_use]
    pub fn min_value(self) -> f64 {
        match self {
            ValueKind::U8 | ValueKind::U16 => 0.0,
            ValueKind::I32 => f64::from(i32::MIN),
            ValueKind::F32 | ValueKind::Complex64 => f64::from(f32::MIN),
            ValueKind::F64 => f64::MIN,
        }
    }

    /// Largest raw value the kind can store.
    #[must_use]
    pub fn max_value(self) -> f64 {
        match self {
            ValueKind::U8 => f64::from(u8::MAX),
            ValueKind::U16 => f64::from(u16::MAX),
            ValueKind::I32 => f64::from(i32::MAX),
            ValueKind::F32 | ValueKind::Complex64 => f64::from(f32::MAX),
            ValueKind::F64 => f64::MAX,
        }
    }

    /// Clamp a value into the representable range, rounding for integer kinds.
    #[must_use]
    #[inline]
    pub fn clamp(self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        let v = if self.is_integer() { value.round() } else { value };
        v.clamp(self.min_value(), self.max_value())
    }

    /// Returns true for integer storage.
    #[must_use]
    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::U8 | ValueKind::U16 | ValueKind::I32)
    }

    /// Bytes per stored voxel.
    #[must_use]
    pub fn bytes_per_voxel(self) -> usize {
        match self {
            ValueKind::U8 => 1,
            ValueKind::U16 => 2,
            ValueKind::I32 | ValueKind::F32 => 4,
            ValueKind::F64 | ValueKind::Complex64 => 8,
        }
    }

    /// Default upper display threshold for a freshly created channel.
    ///
    /// Integer kinds use their full range; floating kinds start at 1000.
    #[must_use]
    pub fn default_window_max(self) -> f64 {
        match self {
            ValueKind::U8 | ValueKind::U16 => self.max_value(),
            ValueKind::I32 => f64::from(u16::MAX),
            ValueKind::F32 | ValueKind::F64 | ValueKind::Complex64 => 1000.0,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::U8 => write!(f, "u8"),
            ValueKind::U16 => write!(f, "u16"),
            ValueKind::I32 => write!(f, "i32"),
            ValueKind::F32 => write!(f, "f32"),
            ValueKind::F64 => write!(f, "f64"),
            ValueKind::Complex64 => write!(f, "complex64"),
        }
    }
}

/// Which scalar a complex volume reports from its raw getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ComplexMode {
    /// Modulus of the value.
    #[default]
    Magnitude,
    /// Argument in radians.
    Phase,
    /// Real component.
    Real,
    /// Imaginary component.
    Imag,
}

impl ComplexMode {
    /// Reduce a complex pair to the selected scalar.
    #[must_use]
    #[inline]
    pub fn select(self, re: f32, im: f32) -> f64 {
        let (re, im) = (f64::from(re), f64::from(im));
        match self {
            ComplexMode::Magnitude => re.hypot(im),
            ComplexMode::Phase => im.atan2(re),
            ComplexMode::Real => re,
            ComplexMode::Imag => im,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_integer_kinds() {
        assert!((ValueKind::U8.clamp(300.0) - 255.0).abs() < f64::EPSILON);
        assert!((ValueKind::U8.clamp(-4.0)).abs() < f64::EPSILON);
        assert!((ValueKind::U16.clamp(12.4) - 12.0).abs() < f64::EPSILON);
        assert!((ValueKind::I32.clamp(-1e12) - f64::from(i32::MIN)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clamp_nan_is_zero() {
        for kind in ValueKind::ALL {
            assert!(kind.clamp(f64::NAN).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_complex_modes() {
        assert!((ComplexMode::Magnitude.select(3.0, 4.0) - 5.0).abs() < 1e-12);
        assert!((ComplexMode::Real.select(3.0, 4.0) - 3.0).abs() < f64::EPSILON);
        assert!((ComplexMode::Imag.select(3.0, 4.0) - 4.0).abs() < f64::EPSILON);
        assert!((ComplexMode::Phase.select(0.0, 1.0) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
