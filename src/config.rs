//! Dispatch configuration.

/// Tuning knobs for the CPU pointwise executor.
///
/// Neither value affects results: every output element is computed
/// independently, so any chunking yields bit-identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Outputs with fewer elements than this run on the calling thread.
    pub min_parallel_len: usize,
    /// Number of output elements handed to one rayon task.
    pub chunk_len: usize,
}

impl DispatchConfig {
    pub const DEFAULT_MIN_PARALLEL_LEN: usize = 1 << 15;
    pub const DEFAULT_CHUNK_LEN: usize = 1 << 12;

    /// Always split across the rayon pool, in chunks of `chunk_len`.
    pub fn always_parallel(chunk_len: usize) -> Self {
        Self {
            min_parallel_len: 0,
            chunk_len: chunk_len.max(1),
        }
    }

    /// Never split: every call runs on the calling thread.
    pub fn sequential() -> Self {
        Self {
            min_parallel_len: usize::MAX,
            chunk_len: Self::DEFAULT_CHUNK_LEN,
        }
    }

    #[must_use]
    pub fn with_min_parallel_len(mut self, len: usize) -> Self {
        self.min_parallel_len = len;
        self
    }

    /// Sets the chunk length (clamped to at least 1).
    #[must_use]
    pub fn with_chunk_len(mut self, len: usize) -> Self {
        self.chunk_len = len.max(1);
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_parallel_len: Self::DEFAULT_MIN_PARALLEL_LEN,
            chunk_len: Self::DEFAULT_CHUNK_LEN,
        }
    }
}
