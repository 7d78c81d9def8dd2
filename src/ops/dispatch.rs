//! Pointwise dispatch.
//!
//! Turns a scalar rule into a broadcasting, promoting, parallel kernel over
//! arbitrary shapes. One call:
//!
//! 1. checks every input lives on the same [`Backend`]
//! 2. resolves compute/output dtypes through the [`PromotionPolicy`]
//! 3. infers (or checks) the broadcast output shape
//! 4. allocates the output and applies the rule at every output position
//!
//! Execution is routed by backend: `Wgpu` tensors try the GPU first when the
//! feature is enabled; everything else, and every call the GPU declines, runs
//! on the rayon CPU executor.
//!
//! # Design Highlights
//! - **Implemented once**: operators only supply a rule and a policy
//! - **No hidden copies**: inputs are read in place through broadcast strides
//! - **Fallback logic**: safe and deterministic fallback to CPU

use crate::backend::Backend;
use crate::config::DispatchConfig;
use crate::dtype::ComputeFloat;
use crate::error::{Error, Result};
use crate::promotion::{Promotion, PromotionPolicy};
use crate::shape::{self, BroadcastIndexer};
use crate::tensors::{Storage, Tensor};

/// A stateless scalar rule over `N` operands.
///
/// `apply` sees every operand already widened to the compute type and returns
/// the output element in that type; narrowing to the output dtype is done by
/// the executor. Implementations must not depend on evaluation order, since
/// positions are computed concurrently.
pub trait PointwiseRule<const N: usize>: Sync {
    /// Operator name used in errors and diagnostics.
    const NAME: &'static str;

    /// Compute one output element.
    fn apply<C: ComputeFloat>(&self, args: [C; N]) -> C;

    /// The rule as a WGSL `f32` expression over `x` and `y`, if it has one.
    ///
    /// Only binary rules are offloaded to the GPU.
    fn wgsl(&self) -> Option<&'static str> {
        None
    }
}

/// Applies [`PointwiseRule`]s to tensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Apply `rule` over the broadcast of all `inputs`.
    ///
    /// # Errors
    /// - [`Error::DeviceMismatch`] if inputs are tagged with different backends
    /// - [`Error::UnsupportedDType`] if a promoted operand is not floating point
    /// - [`Error::ShapeMismatch`] if the input shapes do not broadcast
    pub fn pointwise<R, const N: usize>(
        &self,
        rule: &R,
        policy: &PromotionPolicy,
        inputs: [&Tensor; N],
    ) -> Result<Tensor>
    where
        R: PointwiseRule<N>,
    {
        let (device, promotion) = prepare::<R, N>(policy, &inputs)?;
        let out_shape = shape::broadcast_all(inputs.iter().map(|t| t.shape.as_slice()))
            .ok_or_else(|| Error::ShapeMismatch {
                op: R::NAME,
                shapes: inputs.iter().map(|t| t.shape.clone()).collect(),
            })?;
        self.execute(rule, promotion, inputs, out_shape, device)
    }

    /// Apply `rule` with a fixed output shape every input must broadcast to.
    ///
    /// # Errors
    /// As [`Dispatcher::pointwise`]; `ShapeMismatch` also covers an input that
    /// would have to grow `out_shape`.
    pub fn pointwise_to<R, const N: usize>(
        &self,
        rule: &R,
        policy: &PromotionPolicy,
        inputs: [&Tensor; N],
        out_shape: &[usize],
    ) -> Result<Tensor>
    where
        R: PointwiseRule<N>,
    {
        let (device, promotion) = prepare::<R, N>(policy, &inputs)?;
        if !inputs
            .iter()
            .all(|t| shape::broadcastable_to(&t.shape, out_shape))
        {
            let mut shapes: Vec<Vec<usize>> = inputs.iter().map(|t| t.shape.clone()).collect();
            shapes.push(out_shape.to_vec());
            return Err(Error::ShapeMismatch { op: R::NAME, shapes });
        }
        self.execute(rule, promotion, inputs, out_shape.to_vec(), device)
    }

    fn execute<R, const N: usize>(
        &self,
        rule: &R,
        promotion: Promotion,
        inputs: [&Tensor; N],
        out_shape: Vec<usize>,
        device: Backend,
    ) -> Result<Tensor>
    where
        R: PointwiseRule<N>,
    {
        let numel = shape::numel(&out_shape);
        let mut storage = Storage::zeros(promotion.output, numel);

        if numel > 0 {
            let indexer = BroadcastIndexer::new(inputs.map(|t| t.shape.as_slice()), &out_shape);
            let operands = inputs.map(|t| &t.storage);

            if !self.try_accelerated(rule, promotion, &operands, &indexer, &mut storage, device) {
                super::cpu::fill(rule, promotion.compute, operands, &indexer, &mut storage, &self.config)?;
            }
        }

        Ok(Tensor {
            shape: out_shape,
            storage,
            device,
        })
    }

    /// Returns `true` if a non-CPU backend produced the output.
    #[allow(unused_variables)]
    fn try_accelerated<R, const N: usize>(
        &self,
        rule: &R,
        promotion: Promotion,
        operands: &[&Storage; N],
        indexer: &BroadcastIndexer<N>,
        out: &mut Storage,
        device: Backend,
    ) -> bool
    where
        R: PointwiseRule<N>,
    {
        match device {
            Backend::Cpu => false,
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    if let Some(result) = super::wgpu::wgpu_pointwise(rule, promotion, operands, indexer) {
                        *out = result;
                        return true;
                    }
                }
                tracing::debug!(
                    component = crate::COMPONENT,
                    op = R::NAME,
                    device = %device,
                    "wgpu path unavailable, falling back to cpu"
                );
                false
            }
        }
    }
}

fn prepare<R, const N: usize>(policy: &PromotionPolicy, inputs: &[&Tensor; N]) -> Result<(Backend, Promotion)>
where
    R: PointwiseRule<N>,
{
    let device = inputs.first().map_or(Backend::Cpu, |t| t.device);
    if inputs.iter().any(|t| t.device != device) {
        return Err(Error::DeviceMismatch {
            op: R::NAME,
            devices: inputs.iter().map(|t| t.device).collect(),
        });
    }
    let dtypes: Vec<_> = inputs.iter().map(|t| t.dtype()).collect();
    let promotion = policy.resolve(R::NAME, &dtypes)?;
    Ok((device, promotion))
}
