use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;

use bytemuck::Pod;

use crate::precision::Precision;

/// Trait for scalar types that can be stored in matrices and shipped to a device.
///
/// `Pod` lets buffers cross the host/device boundary as raw bytes; the
/// arithmetic bounds are what the reference product and the host kernel need.
pub trait Element:
    Pod
    + Copy
    + Clone
    + Send
    + Sync
    + Debug
    + Display
    + Default
    + PartialOrd
    + FromStr
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Sum
    + 'static
    + Sized
{
    /// Precision tag used to pick kernels and tolerances.
    const PRECISION: Precision;

    /// The additive identity.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    /// Widen to `f64` for comparisons.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`, rounding to the nearest representable value.
    fn from_f64(v: f64) -> Self;

    /// Absolute difference, widened to `f64`.
    #[inline(always)]
    fn abs_diff(self, rhs: Self) -> f64 {
        (self.to_f64() - rhs.to_f64()).abs()
    }
}

macro_rules! impl_element_float {
    ($($t:ty => $precision:expr),*) => {
        $(
            impl Element for $t {
                const PRECISION: Precision = $precision;

                #[inline(always)]
                fn zero() -> Self {
                    0.0
                }

                #[inline(always)]
                fn one() -> Self {
                    1.0
                }

                #[inline(always)]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline(always)]
                fn from_f64(v: f64) -> Self {
                    v as $t
                }
            }
        )*
    };
}

impl_element_float!(f32 => Precision::Single, f64 => Precision::Double);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        assert_eq!(f32::zero(), 0.0);
        assert_eq!(f32::one(), 1.0);
        assert_eq!(f64::zero(), 0.0);
        assert_eq!(f64::one(), 1.0);
    }

    #[test]
    fn test_precision_tags() {
        assert_eq!(f32::PRECISION, Precision::Single);
        assert_eq!(f64::PRECISION, Precision::Double);
    }

    #[test]
    fn test_abs_diff() {
        assert_eq!(3.0f32.abs_diff(5.0), 2.0);
        assert_eq!(5.0f64.abs_diff(3.0), 2.0);
        assert!(f64::NAN.abs_diff(1.0).is_nan());
    }

    #[test]
    fn test_f64_roundtrip() {
        assert_eq!(f32::from_f64(1.5).to_f64(), 1.5);
        assert_eq!(f64::from_f64(0.1), 0.1);
    }
}
