//! Backend (device) tags.
//!
//! Every [`Tensor`](crate::tensors::Tensor) carries a `Backend` that says where
//! pointwise kernels over it should run. The tag is per tensor, so there is no
//! global backend switch: the dispatcher routes each call by the backend shared
//! by its inputs.
//!
//! # Supported Backends
//!
//! - `Cpu`: rayon-parallel host execution (default, always available).
//! - `Wgpu`: WGSL compute shaders through `wgpu` (requires the `wgpu` feature).
//!   Without the feature, or whenever the GPU path cannot serve a call, work
//!   falls back to the CPU.

use core::fmt;

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Host CPU (default).
    #[default]
    Cpu,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu,
}

impl Backend {
    /// Short lowercase name, used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_default() {
        assert_eq!(Backend::default(), Backend::Cpu);
    }

    #[test]
    fn display_uses_short_name() {
        assert_eq!(Backend::Cpu.to_string(), "cpu");
        assert_eq!(Backend::Wgpu.to_string(), "wgpu");
    }
}
