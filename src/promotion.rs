//! DType promotion.
//!
//! When operands with different dtypes meet in a pointwise rule, a
//! [`PromotionPolicy`] picks two dtypes for the call:
//!
//! - the **output** dtype: the conventional promotion of the participating
//!   operands (`f16 < bf16 < f32 < f64`, with `f16 + bf16 -> f32` since neither
//!   half format contains the other);
//! - the **compute** dtype: the output dtype widened to at least `f32`, so the
//!   arithmetic never runs in half precision even when every input is half.

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Promote two floating-point dtypes to a common result dtype.
///
/// Non-float arguments are returned as-is on the "other" side; callers are
/// expected to have rejected them already.
pub fn promote(a: DType, b: DType) -> DType {
    match (a, b) {
        _ if a == b => a,
        (DType::F16, DType::BF16) | (DType::BF16, DType::F16) => DType::F32,
        _ if priority(a) >= priority(b) => a,
        _ => b,
    }
}

/// Numeric priority for float promotion (higher = wider).
fn priority(dt: DType) -> u8 {
    match dt {
        DType::F16 => 1,
        DType::BF16 => 2,
        DType::F32 => 3,
        DType::F64 => 4,
        DType::I32 | DType::I64 | DType::Bool => 0,
    }
}

/// The dtype intermediate math is performed in for a given output dtype.
pub fn compute_dtype(output: DType) -> DType {
    match output {
        DType::F64 => DType::F64,
        _ => DType::F32,
    }
}

/// The pair of dtypes a pointwise call runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub compute: DType,
    pub output: DType,
}

/// Which operands take part in promotion.
///
/// Operands not listed keep their own dtype and are only read (for example a
/// boolean mask); every listed operand must be floating point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionPolicy {
    operands: Vec<usize>,
}

impl PromotionPolicy {
    /// Default promotion over the given operand positions.
    ///
    /// # Panics
    /// Panics if `operands` is empty.
    pub fn over(operands: impl Into<Vec<usize>>) -> Self {
        let operands = operands.into();
        assert!(!operands.is_empty(), "promotion needs at least one operand");
        Self { operands }
    }

    /// Resolve compute/output dtypes for a call of `op` with input `dtypes`.
    ///
    /// # Errors
    /// [`Error::UnsupportedDType`] if a participating operand is not floating point.
    ///
    /// # Panics
    /// Panics if the policy names an operand position past `dtypes`.
    pub fn resolve(&self, op: &'static str, dtypes: &[DType]) -> Result<Promotion> {
        let mut output: Option<DType> = None;
        for &i in &self.operands {
            let dtype = dtypes[i];
            if !dtype.is_float() {
                return Err(Error::UnsupportedDType { op, dtype });
            }
            output = Some(output.map_or(dtype, |acc| promote(acc, dtype)));
        }
        // `over` guarantees at least one operand
        let output = output.unwrap_or(DType::F32);
        Ok(Promotion {
            compute: compute_dtype(output),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOATS: [DType; 4] = [DType::F16, DType::BF16, DType::F32, DType::F64];

    #[test]
    fn same_dtype() {
        for dt in FLOATS {
            assert_eq!(promote(dt, dt), dt);
        }
    }

    #[test]
    fn float_promotion() {
        assert_eq!(promote(DType::F16, DType::F32), DType::F32);
        assert_eq!(promote(DType::BF16, DType::F32), DType::F32);
        assert_eq!(promote(DType::F16, DType::BF16), DType::F32);
        assert_eq!(promote(DType::F32, DType::F64), DType::F64);
    }

    #[test]
    fn symmetry() {
        for a in FLOATS {
            for b in FLOATS {
                assert_eq!(promote(a, b), promote(b, a), "promote({a:?}, {b:?}) not symmetric");
            }
        }
    }

    #[test]
    fn compute_is_at_least_single() {
        let policy = PromotionPolicy::over([0, 1]);
        let p = policy.resolve("t", &[DType::F16, DType::F16]).unwrap();
        assert_eq!(p, Promotion { compute: DType::F32, output: DType::F16 });
        let p = policy.resolve("t", &[DType::F64, DType::BF16]).unwrap();
        assert_eq!(p, Promotion { compute: DType::F64, output: DType::F64 });
    }

    #[test]
    fn non_participating_operands_are_ignored() {
        let policy = PromotionPolicy::over([0]);
        let p = policy.resolve("t", &[DType::BF16, DType::Bool]).unwrap();
        assert_eq!(p.output, DType::BF16);
    }

    #[test]
    fn rejects_integer_operands() {
        let policy = PromotionPolicy::over([0, 1]);
        assert_eq!(
            policy.resolve("t", &[DType::F32, DType::I32]),
            Err(Error::UnsupportedDType { op: "t", dtype: DType::I32 })
        );
    }
}
