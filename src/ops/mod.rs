//! # Operation Dispatch Layer
//!
//! This module defines pointwise tensor operators and dispatches them across
//! compute backends.
//!
//! ## Submodules
//!
//! - [`dispatch`]: the [`PointwiseRule`](dispatch::PointwiseRule) trait and the
//!   [`Dispatcher`](dispatch::Dispatcher): promotion, broadcasting, allocation, routing
//! - [`cpu`]: rayon-parallel CPU executor (default fallback backend)
//! - `wgpu` *(opt-in)*: WGSL compute pipelines using `wgpu`
//! - [`silu_and_mul`]: the fused `silu(x) * y` operator
//! - [`masked_fill`]: mask-driven fill, out-of-place and in-place
//! - [`arith`]: plain `add` / `mul`, also used for gradient math
//!
//! ## Extending
//!
//! To add a new pointwise operator:
//!
//! 1. Write a scalar rule implementing `PointwiseRule<N>` (optionally with a WGSL body)
//! 2. Pick a `PromotionPolicy` naming the operands that decide the output dtype
//! 3. Call `Dispatcher::pointwise` from a thin facade
//!
//! ## Notes
//!
//! - GPU execution is only compiled in with the `wgpu` feature
//! - Any call the GPU cannot serve runs on the CPU instead
//!
//! ## Feature Flags
//!
//! - `wgpu`: Enables the `wgpu` (WebGPU) backend

pub mod arith;
pub mod cpu;
pub mod dispatch;
pub mod masked_fill;
pub mod silu_and_mul;

#[cfg(feature = "wgpu")]
pub mod wgpu;
