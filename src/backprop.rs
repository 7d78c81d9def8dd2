//! Differentiable operation graph.
//!
//! # Tape-based Autograd
//!
//! A [`Graph`] records every operation applied to its variables on an
//! append-only tape. Each node carries its forward value and a [`Backward`]
//! tag saying what reverse mode may do with it:
//!
//! - **`Leaf`**: an input; gradients accumulate here and stop.
//! - **`Differentiable`**: a closure mapping `dL/d(out)` to one gradient per input.
//! - **`ForwardOnly`**: the operation was recorded without a gradient rule.
//!   [`Graph::backward`] fails with [`Error::NoGradientDefined`] as soon as a
//!   gradient reaches such a node, instead of inventing (or dropping) one.
//!
//! `silu_and_mul` is registered forward-only; `add` and `mul` are differentiable.
//!
//! ## Usage Guidelines
//!
//! - Gradients of broadcast inputs are summed back to the input's own shape.
//! - A variable used several times receives the sum of all its gradients.
//! - Forward-only nodes that no gradient flows through never cause an error.
//!
//! # Example
//! ```rust
//! use briny_fused::backprop::Graph;
//! use briny_fused::tensors::Tensor;
//!
//! let mut g = Graph::new();
//! let a = g.leaf(Tensor::new(vec![2], vec![1.0f64, 2.0]));
//! let b = g.leaf(Tensor::new(vec![2], vec![3.0f64, 4.0]));
//! let c = g.mul(a, b)?;
//! let grads = g.backward(c, Tensor::new(vec![2], vec![1.0f64, 1.0]))?;
//! assert_eq!(grads.get(a).unwrap().data::<f64>(), Some(&[3.0, 4.0][..]));
//! # Ok::<(), briny_fused::Error>(())
//! ```

use std::collections::HashMap;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::{arith, silu_and_mul::silu_and_mul};
use crate::shape;
use crate::tensors::{Storage, Tensor};

/// Gradient rule: `dL/d(out)` to one `dL/d(input)` per recorded input.
pub type BackwardFn = Box<dyn Fn(&Tensor) -> Result<Vec<Tensor>> + Send + Sync>;

/// What reverse mode may do with a node.
pub enum Backward {
    /// A graph input.
    Leaf,
    /// An operation with a gradient rule.
    Differentiable(BackwardFn),
    /// An operation recorded without a gradient rule.
    ForwardOnly,
}

impl std::fmt::Debug for Backward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf => f.write_str("Leaf"),
            Self::Differentiable(_) => f.write_str("Differentiable(..)"),
            Self::ForwardOnly => f.write_str("ForwardOnly"),
        }
    }
}

/// Handle to a value recorded in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

#[derive(Debug)]
struct Node {
    op: &'static str,
    inputs: Vec<Var>,
    value: Tensor,
    backward: Backward,
}

/// Append-only tape of recorded operations.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded nodes, leaves included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record an input value.
    pub fn leaf(&mut self, value: Tensor) -> Var {
        self.push(Node {
            op: "leaf",
            inputs: Vec::new(),
            value,
            backward: Backward::Leaf,
        })
    }

    /// The forward value of `var`.
    ///
    /// # Panics
    /// Panics if `var` belongs to another graph and is out of range.
    pub fn value(&self, var: Var) -> &Tensor {
        &self.nodes[var.0].value
    }

    /// The operation that produced `var`.
    pub fn op(&self, var: Var) -> &'static str {
        self.nodes[var.0].op
    }

    /// Whether a gradient can be propagated through the node behind `var`.
    pub fn is_differentiable(&self, var: Var) -> bool {
        !matches!(self.nodes[var.0].backward, Backward::ForwardOnly)
    }

    /// Run `compute` on the values of `inputs` and record the result.
    ///
    /// Nothing is recorded if `compute` fails; the error is returned unchanged.
    pub fn record<const N: usize>(
        &mut self,
        op: &'static str,
        inputs: [Var; N],
        compute: impl FnOnce([&Tensor; N]) -> Result<Tensor>,
        backward: Backward,
    ) -> Result<Var> {
        let value = compute(inputs.map(|v| self.value(v)))?;
        Ok(self.push(Node {
            op,
            inputs: inputs.to_vec(),
            value,
            backward,
        }))
    }

    /// `silu(a) * b`, recorded as a forward-only node.
    pub fn silu_and_mul(&mut self, a: Var, b: Var) -> Result<Var> {
        self.record(
            "silu_and_mul",
            [a, b],
            |[x, y]| silu_and_mul(x, y),
            Backward::ForwardOnly,
        )
    }

    /// `a + b` with broadcasting.
    pub fn add(&mut self, a: Var, b: Var) -> Result<Var> {
        let a_shape = self.value(a).shape.clone();
        let b_shape = self.value(b).shape.clone();
        let back = move |grad: &Tensor| {
            Ok(vec![sum_to_shape(grad, &a_shape)?, sum_to_shape(grad, &b_shape)?])
        };
        self.record(
            "add",
            [a, b],
            |[x, y]| arith::add(x, y),
            Backward::Differentiable(Box::new(back)),
        )
    }

    /// `a * b` with broadcasting.
    pub fn mul(&mut self, a: Var, b: Var) -> Result<Var> {
        let a_val = self.value(a).clone();
        let b_val = self.value(b).clone();
        let back = move |grad: &Tensor| {
            let grad_a = arith::mul(grad, &b_val)?;
            let grad_b = arith::mul(grad, &a_val)?;
            Ok(vec![
                sum_to_shape(&grad_a, &a_val.shape)?,
                sum_to_shape(&grad_b, &b_val.shape)?,
            ])
        };
        self.record(
            "mul",
            [a, b],
            |[x, y]| arith::mul(x, y),
            Backward::Differentiable(Box::new(back)),
        )
    }

    /// Reverse-mode pass from `root`, seeded with `dL/d(root) = seed`.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if `seed` does not have the root's shape
    /// - [`Error::NoGradientDefined`] if a gradient reaches a forward-only node
    /// - any error raised by a gradient rule
    pub fn backward(&self, root: Var, seed: Tensor) -> Result<Gradients> {
        let root_shape = &self.value(root).shape;
        if seed.shape != *root_shape {
            return Err(Error::ShapeMismatch {
                op: "backward",
                shapes: vec![seed.shape, root_shape.clone()],
            });
        }

        let mut grads: HashMap<Var, Tensor> = HashMap::new();
        grads.insert(root, seed);

        // the tape is topologically ordered: inputs always precede their users
        for id in (0..=root.0).rev() {
            let var = Var(id);
            let node = &self.nodes[id];
            let (rule, grad) = match (&node.backward, grads.get(&var)) {
                (Backward::Leaf, _) | (_, None) => continue,
                (Backward::ForwardOnly, Some(_)) => {
                    tracing::debug!(
                        component = crate::COMPONENT,
                        op = node.op,
                        "backward reached a forward-only node"
                    );
                    return Err(Error::NoGradientDefined { op: node.op });
                }
                (Backward::Differentiable(rule), Some(g)) => (rule, g.clone()),
            };

            let input_grads = rule(&grad)?;
            for (input, g) in node.inputs.iter().zip(input_grads) {
                let acc = match grads.remove(input) {
                    Some(prev) => arith::add(&prev, &g)?,
                    None => g,
                };
                grads.insert(*input, acc);
            }
            // interior gradients are not reported
            grads.remove(&var);
        }

        grads.retain(|var, _| matches!(self.nodes[var.0].backward, Backward::Leaf));
        Ok(Gradients(grads))
    }

    fn push(&mut self, node: Node) -> Var {
        self.nodes.push(node);
        Var(self.nodes.len() - 1)
    }
}

/// Leaf gradients produced by [`Graph::backward`].
#[derive(Debug, Default)]
pub struct Gradients(HashMap<Var, Tensor>);

impl Gradients {
    /// Gradient of a leaf, or `None` if no gradient reached it.
    pub fn get(&self, var: Var) -> Option<&Tensor> {
        self.0.get(&var)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sum a broadcast gradient back down to `target` (which broadcasts to `grad.shape`).
fn sum_to_shape(grad: &Tensor, target: &[usize]) -> Result<Tensor> {
    if grad.shape == target {
        return Ok(grad.clone());
    }
    if !shape::broadcastable_to(target, &grad.shape) {
        return Err(Error::ShapeMismatch {
            op: "sum_to_shape",
            shapes: vec![grad.shape.clone(), target.to_vec()],
        });
    }

    let indexer = shape::BroadcastIndexer::new([target], &grad.shape);

    let mut acc = vec![0.0f64; shape::numel(target)];
    let mut cursor = indexer.cursor(0);
    for i in 0..grad.numel() {
        acc[cursor.offsets()[0]] += grad.storage.load::<f64>(i);
        cursor.advance();
    }

    let storage = match grad.dtype() {
        DType::F16 => Storage::F16(acc.iter().map(|&v| half::f16::from_f64(v)).collect()),
        DType::BF16 => Storage::BF16(acc.iter().map(|&v| half::bf16::from_f64(v)).collect()),
        #[allow(clippy::cast_possible_truncation)]
        DType::F32 => Storage::F32(acc.iter().map(|&v| v as f32).collect()),
        DType::F64 => Storage::F64(acc),
        dtype => return Err(Error::UnsupportedDType { op: "sum_to_shape", dtype }),
    };
    Ok(Tensor {
        shape: target.to_vec(),
        storage,
        device: grad.device,
    })
}
