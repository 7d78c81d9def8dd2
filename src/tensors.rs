//! Core tensor data structures.
//!
//! # Core Tensor Utilities
//!
//! A [`Tensor`] is a contiguous, row-major N-dimensional array: a shape, a
//! typed flat buffer ([`Storage`]) and the [`Backend`] tag kernels over it should
//! run on. Tensors are plain values; operators never mutate their inputs and
//! always hand back a freshly allocated output.
//!
//! ## Design Highlights
//! - Shape is stored as a `Vec<usize>`; a 0-dim tensor has shape `[]` and one element
//! - Storage is an enum over the supported element types, tagged by [`DType`]
//! - The `tensor!` macro supports ergonomic tensor creation from nested arrays
//!
//! ## Limitations
//! - Row-major and contiguous only (broadcasting is resolved by the dispatcher,
//!   never by materializing expanded copies)
//!
//! ## Example
//!
//! ```rust
//! use briny_fused::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! ```

use half::{bf16, f16};

use crate::backend::Backend;
use crate::dtype::{ComputeFloat, DType, Element};
use crate::error::{Error, Result};

/// Typed flat element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl Storage {
    /// A zero-filled buffer of `len` elements of `dtype`.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F16 => Self::F16(vec![f16::ZERO; len]),
            DType::BF16 => Self::BF16(vec![bf16::ZERO; len]),
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::F64 => Self::F64(vec![0.0; len]),
            DType::I32 => Self::I32(vec![0; len]),
            DType::I64 => Self::I64(vec![0; len]),
            DType::Bool => Self::Bool(vec![false; len]),
        }
    }

    /// The dtype tag of the buffer.
    pub fn dtype(&self) -> DType {
        match self {
            Self::F16(_) => DType::F16,
            Self::BF16(_) => DType::BF16,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::Bool(_) => DType::Bool,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen the element at `index` into the compute type `C`.
    ///
    /// The match is on the variant, which is the same for every element of a
    /// buffer, so in a loop the branch is perfectly predicted.
    #[inline]
    pub fn load<C: ComputeFloat>(&self, index: usize) -> C {
        match self {
            Self::F16(v) => C::widen(v[index]),
            Self::BF16(v) => C::widen(v[index]),
            Self::F32(v) => C::widen(v[index]),
            Self::F64(v) => C::widen(v[index]),
            Self::I32(v) => C::widen(v[index]),
            Self::I64(v) => C::widen(v[index]),
            Self::Bool(v) => C::widen(v[index]),
        }
    }

    /// Copy every element out as `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.load::<f64>(i)).collect()
    }
}

impl<E: Element> From<Vec<E>> for Storage {
    fn from(data: Vec<E>) -> Self {
        E::into_storage(data)
    }
}

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `storage` holds the flattened content in row-major order.
/// - `device` says which backend pointwise kernels over it run on.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub storage: Storage,
    pub device: Backend,
}

impl Tensor {
    /// Creates a new CPU tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    /// Use [`Tensor::try_new`] to get an error instead.
    pub fn new(shape: impl Into<Vec<usize>>, data: impl Into<Storage>) -> Self {
        match Self::try_new(shape, data) {
            Ok(t) => t,
            Err(e) => panic!("{e}"),
        }
    }

    /// Creates a new CPU tensor, failing with [`Error::LengthMismatch`] if
    /// `data` does not hold exactly `prod(shape)` elements.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: impl Into<Storage>) -> Result<Self> {
        let shape = shape.into();
        let storage = data.into();
        if shape.iter().product::<usize>() != storage.len() {
            return Err(Error::LengthMismatch {
                shape,
                len: storage.len(),
            });
        }
        Ok(Self {
            shape,
            storage,
            device: Backend::Cpu,
        })
    }

    /// A 0-dimensional tensor holding `value`.
    pub fn scalar<E: Element>(value: E) -> Self {
        Self::new(Vec::new(), vec![value])
    }

    /// A tensor of `shape` filled with zeros of `dtype`.
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DType) -> Self {
        let shape = shape.into();
        let storage = Storage::zeros(dtype, shape.iter().product());
        Self {
            shape,
            storage,
            device: Backend::Cpu,
        }
    }

    /// Retags the tensor for another backend.
    #[must_use]
    pub fn on(mut self, device: Backend) -> Self {
        self.device = device;
        self
    }

    /// Element type of the storage.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    /// Borrow the typed buffer, or `None` if `E` is not this tensor's dtype.
    pub fn data<E: Element>(&self) -> Option<&[E]> {
        E::slice(&self.storage)
    }

    /// Copy every element out as `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.to_f64_vec()
    }

    /// The single value of a 0-dimensional tensor, as `f64`.
    pub fn item(&self) -> Result<f64> {
        if !self.shape.is_empty() {
            return Err(Error::NotAScalar {
                shape: self.shape.clone(),
            });
        }
        Ok(self.storage.load::<f64>(0))
    }

    /// Replaces this tensor's data with another tensor of the same shape.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    pub fn update(&mut self, mut other: Tensor) {
        assert_eq!(self.shape, other.shape, "shape mismatch");
        std::mem::swap(&mut self.storage, &mut other.storage);
    }
}

/// Defines a CPU tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
/// The element type is the literal's type (`f64` for bare float literals).
///
/// # Example
/// ```
/// use briny_fused::tensor;
/// let t = tensor!([[1.0f32, -2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($($t:tt)+) => {{
        let (shape, data) = $crate::__tensor_parts!($($t)+);
        $crate::tensors::Tensor::new(shape, data)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tensor_parts {
    ([ $( [ $($inner:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::__tensor_parts!([ $($inner)* ]) ),+ ];
        let first_shape = children[0].0.clone();
        assert!(children.iter().all(|c| c.0 == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].1.len());
        for c in children { data.extend(c.1); }
        (shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data = vec![ $( $x ),+ ];
        (vec![data.len()], data)
    }};

    ($x:expr) => {
        (::std::vec::Vec::<usize>::new(), vec![$x])
    };
}
