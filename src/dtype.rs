//! Element types.
//!
//! [`DType`] is the runtime tag carried by tensor storage. [`Element`] is the
//! compile-time counterpart for every storable scalar, and [`ComputeFloat`] is
//! the (narrower) set of types pointwise math is actually evaluated in: `f32`
//! and `f64`. Half-precision values are always widened before any arithmetic.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

use half::{bf16, f16};

use crate::tensors::Storage;

/// Runtime element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// IEEE 754 half precision.
    F16,
    /// Brain float (f32 exponent range, 8-bit mantissa).
    BF16,
    /// IEEE 754 single precision.
    F32,
    /// IEEE 754 double precision.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// Boolean, used for masks.
    Bool,
}

impl DType {
    /// Whether this dtype is one of the floating-point formats.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Size in bytes of one element.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::F16 | Self::BF16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// Lowercase name (`"f16"`, `"bool"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar that can live in tensor storage.
///
/// Conversions go through `f32`/`f64` only; the `from_*` direction rounds to
/// nearest for floats and saturates for integers.
pub trait Element: Copy + Send + Sync + 'static {
    /// The runtime tag of this element type.
    const DTYPE: DType;

    /// Convert to `f32`.
    fn into_f32(self) -> f32;
    /// Convert from `f32`.
    fn from_f32(x: f32) -> Self;
    /// Convert to `f64`.
    fn into_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;

    /// Borrow the typed buffer if `storage` holds this element type.
    fn slice(storage: &Storage) -> Option<&[Self]>;
    /// Wrap an owned buffer in the matching storage variant.
    fn into_storage(data: Vec<Self>) -> Storage;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:ident, $variant:ident, $into32:expr, $from32:expr, $into64:expr, $from64:expr) => {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        impl Element for $ty {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn into_f32(self) -> f32 {
                ($into32)(self)
            }

            #[inline]
            fn from_f32(x: f32) -> Self {
                ($from32)(x)
            }

            #[inline]
            fn into_f64(self) -> f64 {
                ($into64)(self)
            }

            #[inline]
            fn from_f64(x: f64) -> Self {
                ($from64)(x)
            }

            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_storage(data: Vec<Self>) -> Storage {
                Storage::$variant(data)
            }
        }
    };
}

impl_element!(f16, F16, F16, f16::to_f32, f16::from_f32, f16::to_f64, f16::from_f64);
impl_element!(bf16, BF16, BF16, bf16::to_f32, bf16::from_f32, bf16::to_f64, bf16::from_f64);
impl_element!(
    f32,
    F32,
    F32,
    |x: f32| x,
    |x: f32| x,
    f64::from,
    |x: f64| x as f32
);
impl_element!(
    f64,
    F64,
    F64,
    |x: f64| x as f32,
    f64::from,
    |x: f64| x,
    |x: f64| x
);
impl_element!(
    i32,
    I32,
    I32,
    |x: i32| x as f32,
    |x: f32| x as i32,
    f64::from,
    |x: f64| x as i32
);
impl_element!(
    i64,
    I64,
    I64,
    |x: i64| x as f32,
    |x: f32| x as i64,
    |x: i64| x as f64,
    |x: f64| x as i64
);
impl_element!(
    bool,
    Bool,
    Bool,
    |x: bool| if x { 1.0f32 } else { 0.0 },
    |x: f32| x != 0.0,
    |x: bool| if x { 1.0f64 } else { 0.0 },
    |x: f64| x != 0.0
);

/// A float type pointwise rules are evaluated in.
///
/// Only `f32` and `f64` implement this: intermediate math is never performed in
/// a type narrower than single precision.
pub trait ComputeFloat:
    Copy
    + Send
    + Sync
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// The runtime tag of this compute type.
    const DTYPE: DType;
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;

    /// `e^self`, IEEE semantics (overflows to `+inf`).
    fn exp(self) -> Self;
    /// Widen a stored element into this compute type.
    fn widen<E: Element>(e: E) -> Self;
    /// Narrow a computed value into a storage element type.
    fn narrow<E: Element>(self) -> E;
    /// Convert an `f64` constant into this compute type.
    fn from_f64(x: f64) -> Self;
}

impl ComputeFloat for f32 {
    const DTYPE: DType = DType::F32;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn exp(self) -> Self {
        f32::exp(self)
    }

    #[inline]
    fn widen<E: Element>(e: E) -> Self {
        e.into_f32()
    }

    #[inline]
    fn narrow<E: Element>(self) -> E {
        E::from_f32(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    #[inline]
    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl ComputeFloat for f64 {
    const DTYPE: DType = DType::F64;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn widen<E: Element>(e: E) -> Self {
        e.into_f64()
    }

    #[inline]
    fn narrow<E: Element>(self) -> E {
        E::from_f64(self)
    }

    #[inline]
    fn from_f64(x: f64) -> Self {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_classification() {
        for dt in [DType::F16, DType::BF16, DType::F32, DType::F64] {
            assert!(dt.is_float(), "{dt} should be float");
        }
        for dt in [DType::I32, DType::I64, DType::Bool] {
            assert!(!dt.is_float(), "{dt} should not be float");
        }
    }

    #[test]
    fn half_widening_is_exact() {
        let h = f16::from_f32(0.333);
        assert_eq!(<f32 as ComputeFloat>::widen(h), h.to_f32());
        assert_eq!(<f64 as ComputeFloat>::widen(h), h.to_f64());
    }

    #[test]
    fn integer_narrowing_saturates() {
        assert_eq!(<f32 as ComputeFloat>::narrow::<i32>(1e20), i32::MAX);
        assert_eq!(<f64 as ComputeFloat>::narrow::<i64>(-1e300), i64::MIN);
    }

    #[test]
    fn bool_round_trip() {
        assert!(<f32 as ComputeFloat>::narrow::<bool>(0.5));
        assert!(!<f32 as ComputeFloat>::narrow::<bool>(0.0));
        assert_eq!(<f64 as ComputeFloat>::widen(true), 1.0);
    }
}
