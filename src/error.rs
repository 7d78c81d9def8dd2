//! Error taxonomy shared by dispatch, operators and the graph executor.
//!
//! Every failure here is deterministic given the inputs, so nothing in the
//! crate retries. Numeric edge values (NaN, ±Inf) are never errors.

use crate::backend::Backend;
use crate::dtype::DType;

/// Errors surfaced by tensor construction, pointwise dispatch and backprop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input shapes cannot be broadcast together (or to the fixed output shape).
    #[error("{op}: shapes {shapes:?} are not broadcast-compatible")]
    ShapeMismatch {
        op: &'static str,
        shapes: Vec<Vec<usize>>,
    },

    /// An operand's dtype is outside the set the compute rule accepts.
    #[error("{op}: unsupported dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// The inputs of one call live on different backends.
    #[error("{op}: inputs live on different backends {devices:?}")]
    DeviceMismatch {
        op: &'static str,
        devices: Vec<Backend>,
    },

    /// A flat buffer does not hold exactly `prod(shape)` elements.
    #[error("shape {shape:?} is incompatible with {len} data elements")]
    LengthMismatch { shape: Vec<usize>, len: usize },

    /// A scalar was requested from a tensor that is not 0-dimensional.
    #[error("expected a 0-dimensional tensor, got shape {shape:?}")]
    NotAScalar { shape: Vec<usize> },

    /// Backward reached a node that was registered without a gradient rule.
    #[error("{op} is forward-only: no gradient is defined")]
    NoGradientDefined { op: &'static str },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
