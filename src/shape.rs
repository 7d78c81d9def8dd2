//! Broadcasting rules and broadcast-aware index walking.
//!
//! Rules (NumPy-style):
//! 1. Align shapes from the trailing dimension.
//! 2. For each dimension pair: must be equal, or one must be 1.
//! 3. The output dimension is the other one (so `0` against `1` gives `0`).

/// Total number of elements of `shape` (1 for a scalar).
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Compute the broadcast shape of two shapes, or `None` if incompatible.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[ndim - 1 - i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// Broadcast any number of shapes together.
pub fn broadcast_all<'a>(shapes: impl IntoIterator<Item = &'a [usize]>) -> Option<Vec<usize>> {
    shapes
        .into_iter()
        .try_fold(Vec::new(), |acc, s| broadcast_shapes(&acc, s))
}

/// Whether `src` can be expanded to exactly `target` (one-directional).
pub fn broadcastable_to(src: &[usize], target: &[usize]) -> bool {
    src.len() <= target.len()
        && src
            .iter()
            .rev()
            .zip(target.iter().rev())
            .all(|(&s, &t)| s == t || s == 1)
}

/// Row-major strides of a contiguous tensor of `shape`.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut acc = 1;
    for (stride, &dim) in strides.iter_mut().zip(shape).rev() {
        *stride = acc;
        acc *= dim;
    }
    strides
}

/// Strides that read a contiguous `src` as if it were expanded to `target`.
///
/// Broadcast (size-1 or missing) dimensions get stride 0. `src` must be
/// broadcastable to `target`.
pub fn broadcast_strides(src: &[usize], target: &[usize]) -> Vec<usize> {
    debug_assert!(broadcastable_to(src, target));
    let lead = target.len() - src.len();
    let src_strides = contiguous_strides(src);
    (0..target.len())
        .map(|d| {
            if d < lead {
                0
            } else {
                let s = d - lead;
                if src[s] == 1 && target[d] != 1 { 0 } else { src_strides[s] }
            }
        })
        .collect()
}

/// Maps output positions of a broadcast to element offsets in `N` inputs.
#[derive(Debug, Clone)]
pub struct BroadcastIndexer<const N: usize> {
    out_shape: Vec<usize>,
    strides: [Vec<usize>; N],
    // every input already has the output shape: offsets equal the linear index
    identity: bool,
}

impl<const N: usize> BroadcastIndexer<N> {
    /// Build an indexer. Every input shape must be broadcastable to `out_shape`.
    pub fn new(input_shapes: [&[usize]; N], out_shape: &[usize]) -> Self {
        let identity = input_shapes.iter().all(|s| *s == out_shape);
        Self {
            out_shape: out_shape.to_vec(),
            strides: input_shapes.map(|s| broadcast_strides(s, out_shape)),
            identity,
        }
    }

    pub fn out_shape(&self) -> &[usize] {
        &self.out_shape
    }

    /// Per-input strides over the output index space.
    pub fn strides(&self) -> &[Vec<usize>; N] {
        &self.strides
    }

    /// A cursor positioned at output linear index `start`.
    pub fn cursor(&self, start: usize) -> Cursor<'_, N> {
        let mut index = vec![0; self.out_shape.len()];
        let mut offsets = [0; N];
        if self.identity {
            offsets = [start; N];
        } else {
            let mut rem = start;
            for d in (0..self.out_shape.len()).rev() {
                let size = self.out_shape[d].max(1);
                index[d] = rem % size;
                rem /= size;
                for (off, strides) in offsets.iter_mut().zip(&self.strides) {
                    *off += index[d] * strides[d];
                }
            }
        }
        Cursor {
            indexer: self,
            index,
            offsets,
        }
    }
}

/// Odometer over output positions that keeps one input offset per operand.
#[derive(Debug)]
pub struct Cursor<'a, const N: usize> {
    indexer: &'a BroadcastIndexer<N>,
    index: Vec<usize>,
    offsets: [usize; N],
}

impl<const N: usize> Cursor<'_, N> {
    /// Current element offsets into each input.
    #[inline]
    pub fn offsets(&self) -> [usize; N] {
        self.offsets
    }

    /// Step to the next output position (wraps around after the last one).
    #[inline]
    pub fn advance(&mut self) {
        if self.indexer.identity {
            for off in &mut self.offsets {
                *off += 1;
            }
            return;
        }
        let shape = &self.indexer.out_shape;
        for d in (0..shape.len()).rev() {
            self.index[d] += 1;
            for (off, strides) in self.offsets.iter_mut().zip(&self.indexer.strides) {
                *off += strides[d];
            }
            if self.index[d] < shape[d] {
                return;
            }
            for (off, strides) in self.offsets.iter_mut().zip(&self.indexer.strides) {
                *off -= strides[d] * shape[d];
            }
            self.index[d] = 0;
        }
    }
}
