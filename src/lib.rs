//! briny_fused: a fused SiLU-and-multiply tensor kernel in Rust.
//!
//! Computes `silu(a) * b = a / (1 + exp(-a)) * b` elementwise over two tensors
//! in a single pass, with NumPy-style broadcasting and dtype promotion.
//!
//! # Features
//!
//! - Broadcasting over any rank, with size-1 and missing leading dimensions.
//! - Output dtype is the promotion of the inputs; arithmetic runs in at least `f32`.
//! - Data-parallel CPU execution with rayon, bit-identical to sequential runs.
//! - Optional GPU execution through `wgpu`, falling back to the CPU.
//! - Forward-only registration in a differentiable [`Graph`](backprop::Graph).
//!
//! # Modules
//!
//! - [`tensors`]: tensor and typed storage
//! - [`dtype`]: element types and compute precisions
//! - [`shape`]: broadcasting and strided indexing
//! - [`promotion`]: dtype promotion policies
//! - [`ops`]: pointwise operators and backend dispatch
//! - [`backprop`]: tape-based autograd graph
//! - [`config`]: execution tuning
//!
//! # Example
//!
//! ```rust
//! use briny_fused::{silu_and_mul, tensor};
//!
//! let gate = tensor!([[1.0f32], [-1.0]]);
//! let up = tensor!([[2.0f32, 3.0], [4.0, 5.0]]);
//! let out = silu_and_mul(&gate, &up)?;
//! assert_eq!(out.shape, vec![2, 2]);
//! # Ok::<(), briny_fused::Error>(())
//! ```

pub mod backend;
pub mod backprop;
pub mod config;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod promotion;
pub mod shape;
pub mod tensors;

/// Value of the `component` field on every log event emitted by this crate.
pub const COMPONENT: &str = "briny_fused";

pub use backend::Backend;
pub use backprop::{Gradients, Graph, Var};
pub use config::DispatchConfig;
pub use dtype::DType;
pub use error::{Error, Result};
pub use ops::dispatch::Dispatcher;
pub use ops::masked_fill::{masked_fill, masked_fill_, masked_fill_tensor};
pub use ops::silu_and_mul::{silu_and_mul, silu_and_mul_with};
pub use tensors::{Storage, Tensor};
