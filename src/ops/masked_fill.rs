//! Mask-driven fill.
//!
//! `masked_fill(inp, mask, value)` copies `inp`, replacing every element whose
//! (broadcast) mask entry is non-zero with `value`. The mask only ever expands
//! toward `inp`'s shape, never the other way around, and the output keeps
//! `inp`'s dtype whatever the mask dtype is.

use super::dispatch::{Dispatcher, PointwiseRule};
use crate::dtype::ComputeFloat;
use crate::error::Result;
use crate::promotion::PromotionPolicy;
use crate::tensors::Tensor;

/// The scalar rule behind [`masked_fill`].
#[derive(Debug, Clone, Copy)]
pub struct MaskedFill {
    pub value: f64,
}

impl PointwiseRule<2> for MaskedFill {
    const NAME: &'static str = "masked_fill";

    #[inline]
    fn apply<C: ComputeFloat>(&self, [x, mask]: [C; 2]) -> C {
        if mask != C::ZERO { C::from_f64(self.value) } else { x }
    }
}

/// Returns a copy of `inp` with `value` written wherever `mask` is set.
///
/// `mask` may have any dtype (non-zero means set) and must be broadcastable to
/// `inp.shape`. A 0-dim tensor fill value can be passed as `value.item()?`.
///
/// # Errors
/// - [`ShapeMismatch`](crate::Error::ShapeMismatch) if `mask` cannot expand to `inp.shape`
/// - [`UnsupportedDType`](crate::Error::UnsupportedDType) if `inp` is not floating point
///
/// # Example
/// ```rust
/// use briny_fused::ops::masked_fill::masked_fill;
/// use briny_fused::tensors::Tensor;
///
/// let inp = Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
/// let mask = Tensor::new(vec![2], vec![true, false]);
/// let out = masked_fill(&inp, &mask, -1.0)?;
/// assert_eq!(out.data::<f32>(), Some(&[-1.0, 2.0, -1.0, 4.0][..]));
/// # Ok::<(), briny_fused::Error>(())
/// ```
pub fn masked_fill(inp: &Tensor, mask: &Tensor, value: f64) -> Result<Tensor> {
    masked_fill_with(&Dispatcher::default(), inp, mask, value)
}

/// [`masked_fill`] with an explicit dispatcher.
pub fn masked_fill_with(dispatcher: &Dispatcher, inp: &Tensor, mask: &Tensor, value: f64) -> Result<Tensor> {
    tracing::debug!(component = crate::COMPONENT, op = MaskedFill::NAME, "masked fill");
    dispatcher.pointwise_to(
        &MaskedFill { value },
        &PromotionPolicy::over([0]),
        [inp, mask],
        &inp.shape,
    )
}

/// [`masked_fill`] with the fill value given as a 0-dim tensor.
///
/// # Errors
/// [`NotAScalar`](crate::Error::NotAScalar) if `value` is not 0-dim, otherwise
/// as [`masked_fill`].
pub fn masked_fill_tensor(inp: &Tensor, mask: &Tensor, value: &Tensor) -> Result<Tensor> {
    masked_fill(inp, mask, value.item()?)
}

/// In-place [`masked_fill`]: `inp` is only touched if the call succeeds.
pub fn masked_fill_(inp: &mut Tensor, mask: &Tensor, value: f64) -> Result<()> {
    let filled = masked_fill(inp, mask, value)?;
    inp.update(filled);
    Ok(())
}
