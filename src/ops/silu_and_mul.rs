//! Fused SiLU-and-multiply: `out = silu(x) * y`, `silu(x) = x / (1 + exp(-x))`.
//!
//! Both factors are evaluated in one pass per output element, so `silu(x)` is
//! never written to memory. Arithmetic always runs in at least `f32`: for
//! half-precision inputs `exp(-x)` and the division would otherwise lose most of
//! their significant bits near the ends of the representable range.
//!
//! The formula is applied uniformly. For very negative `x`, `exp(-x)` overflows
//! to `+inf` and `silu(x)` becomes `-0.0`, which is the correct limit; nothing
//! is clamped, and NaN or infinite inputs propagate.

use super::dispatch::{Dispatcher, PointwiseRule};
use crate::dtype::ComputeFloat;
use crate::error::Result;
use crate::promotion::PromotionPolicy;
use crate::tensors::Tensor;

/// The scalar rule behind [`silu_and_mul`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SiluAndMul;

impl PointwiseRule<2> for SiluAndMul {
    const NAME: &'static str = "silu_and_mul";

    #[inline]
    fn apply<C: ComputeFloat>(&self, [x, y]: [C; 2]) -> C {
        let silu = x / (C::ONE + (-x).exp());
        silu * y
    }

    fn wgsl(&self) -> Option<&'static str> {
        // clamped exp keeps the negative tail finite on the device
        Some("x * (1.0 / (1.0 + exp(min(-x, 88.0)))) * y")
    }
}

/// Computes `silu(a) * b` elementwise with broadcasting.
///
/// The output shape is the broadcast of both input shapes and its dtype is the
/// promotion of both input dtypes (`f16` with `f32` gives `f32`). Inputs are
/// not modified.
///
/// # Errors
/// - [`ShapeMismatch`](crate::Error::ShapeMismatch) if the shapes do not broadcast
/// - [`UnsupportedDType`](crate::Error::UnsupportedDType) if either input is not floating point
/// - [`DeviceMismatch`](crate::Error::DeviceMismatch) if the inputs are on different backends
///
/// # Example
/// ```rust
/// use briny_fused::{silu_and_mul, tensors::Tensor};
///
/// let gate = Tensor::new(vec![2, 1], vec![0.0f32, 2.0]);
/// let up = Tensor::new(vec![2, 3], vec![1.0f32; 6]);
/// let out = silu_and_mul(&gate, &up)?;
/// assert_eq!(out.shape, vec![2, 3]);
/// # Ok::<(), briny_fused::Error>(())
/// ```
pub fn silu_and_mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    silu_and_mul_with(&Dispatcher::default(), a, b)
}

/// [`silu_and_mul`] with an explicit dispatcher.
pub fn silu_and_mul_with(dispatcher: &Dispatcher, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    tracing::debug!(
        component = crate::COMPONENT,
        op = SiluAndMul::NAME,
        "silu and mul forward"
    );
    dispatcher.pointwise(&SiluAndMul, &PromotionPolicy::over([0, 1]), [a, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_matches_reference_formula() {
        for &x in &[-3.0f64, -0.5, 0.0, 0.5, 3.0] {
            let y = 1.5;
            let expected = x / (1.0 + (-x).exp()) * y;
            assert_eq!(SiluAndMul.apply([x, y]), expected);
        }
    }

    #[test]
    fn rule_limits() {
        let neg = SiluAndMul.apply([-1e4f32, 2.0]);
        assert_eq!(neg, 0.0);
        assert!(neg.is_finite());
        assert_eq!(SiluAndMul.apply([1e4f32, 1.0]), 1e4);
    }

    #[test]
    fn rule_propagates_nan() {
        assert!(SiluAndMul.apply([f32::NAN, 1.0]).is_nan());
        assert!(SiluAndMul.apply([1.0f32, f32::NAN]).is_nan());
    }
}
