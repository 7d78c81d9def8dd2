//! Elementwise `add` and `mul`, with default promotion over both operands.

use super::dispatch::{Dispatcher, PointwiseRule};
use crate::dtype::ComputeFloat;
use crate::error::Result;
use crate::promotion::PromotionPolicy;
use crate::tensors::Tensor;

#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl PointwiseRule<2> for Add {
    const NAME: &'static str = "add";

    #[inline]
    fn apply<C: ComputeFloat>(&self, [x, y]: [C; 2]) -> C {
        x + y
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some("x + y")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl PointwiseRule<2> for Mul {
    const NAME: &'static str = "mul";

    #[inline]
    fn apply<C: ComputeFloat>(&self, [x, y]: [C; 2]) -> C {
        x * y
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some("x * y")
    }
}

/// `a + b` with broadcasting.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    Dispatcher::default().pointwise(&Add, &PromotionPolicy::over([0, 1]), [a, b])
}

/// `a * b` with broadcasting.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    Dispatcher::default().pointwise(&Mul, &PromotionPolicy::over([0, 1]), [a, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use half::bf16;

    #[test]
    fn mixed_half_promotes_to_single() {
        let a = Tensor::new(vec![2], vec![half::f16::from_f32(1.5), half::f16::from_f32(2.0)]);
        let b = Tensor::new(vec![2], vec![bf16::from_f32(0.5), bf16::from_f32(4.0)]);
        let out = mul(&a, &b).unwrap();
        assert_eq!(out.dtype(), DType::F32);
        assert_eq!(out.data::<f32>(), Some(&[0.75, 8.0][..]));
    }

    #[test]
    fn add_broadcasts_rows() {
        let a = Tensor::new(vec![2, 2], vec![1.0f64, 2.0, 3.0, 4.0]);
        let b = Tensor::new(vec![2], vec![10.0f64, 20.0]);
        let out = add(&a, &b).unwrap();
        assert_eq!(out.data::<f64>(), Some(&[11.0, 22.0, 13.0, 24.0][..]));
    }
}
