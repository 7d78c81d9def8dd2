//! Parallel CPU backend for pointwise rules.
//!
//! # CPU Backend
//!
//! The default executor behind [`Dispatcher`](super::dispatch::Dispatcher).
//! The output buffer is split into fixed-size chunks handed to rayon; within a
//! chunk a broadcast cursor walks output positions and tracks the matching
//! element offset in every input, so broadcast operands are never expanded
//! into temporary buffers.
//!
//! ## Design Goals
//!
//! - Deterministic results: every element is computed independently, so the
//!   chunk layout (or whether we go parallel at all) cannot change a single bit
//! - One code path per (compute type, output type) pair, monomorphized

use half::{bf16, f16};
use rayon::prelude::*;

use super::dispatch::PointwiseRule;
use crate::config::DispatchConfig;
use crate::dtype::{ComputeFloat, DType, Element};
use crate::error::{Error, Result};
use crate::shape::BroadcastIndexer;
use crate::tensors::Storage;

/// Evaluate `rule` at every position of `out`, computing in `compute`.
///
/// # Errors
/// [`Error::UnsupportedDType`] if `out` is not a floating-point buffer.
pub fn fill<R, const N: usize>(
    rule: &R,
    compute: DType,
    inputs: [&Storage; N],
    indexer: &BroadcastIndexer<N>,
    out: &mut Storage,
    config: &DispatchConfig,
) -> Result<()>
where
    R: PointwiseRule<N>,
{
    match compute {
        DType::F64 => fill_as::<f64, R, N>(rule, inputs, indexer, out, config),
        _ => fill_as::<f32, R, N>(rule, inputs, indexer, out, config),
    }
}

fn fill_as<C, R, const N: usize>(
    rule: &R,
    inputs: [&Storage; N],
    indexer: &BroadcastIndexer<N>,
    out: &mut Storage,
    config: &DispatchConfig,
) -> Result<()>
where
    C: ComputeFloat,
    R: PointwiseRule<N>,
{
    match out {
        Storage::F16(o) => fill_typed::<C, f16, R, N>(rule, inputs, indexer, o, config),
        Storage::BF16(o) => fill_typed::<C, bf16, R, N>(rule, inputs, indexer, o, config),
        Storage::F32(o) => fill_typed::<C, f32, R, N>(rule, inputs, indexer, o, config),
        Storage::F64(o) => fill_typed::<C, f64, R, N>(rule, inputs, indexer, o, config),
        other => {
            return Err(Error::UnsupportedDType {
                op: R::NAME,
                dtype: other.dtype(),
            });
        }
    }
    Ok(())
}

fn fill_typed<C, O, R, const N: usize>(
    rule: &R,
    inputs: [&Storage; N],
    indexer: &BroadcastIndexer<N>,
    out: &mut [O],
    config: &DispatchConfig,
) where
    C: ComputeFloat,
    O: Element,
    R: PointwiseRule<N>,
{
    let kernel = |start: usize, chunk: &mut [O]| {
        let mut cursor = indexer.cursor(start);
        for slot in chunk.iter_mut() {
            let offsets = cursor.offsets();
            let args: [C; N] = core::array::from_fn(|k| inputs[k].load::<C>(offsets[k]));
            *slot = rule.apply(args).narrow::<O>();
            cursor.advance();
        }
    };

    if out.len() < config.min_parallel_len {
        kernel(0, out);
        return;
    }

    let chunk_len = config.chunk_len.max(1);
    out.par_chunks_mut(chunk_len)
        .enumerate()
        .for_each(|(i, chunk)| kernel(i * chunk_len, chunk));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mad;

    impl PointwiseRule<3> for Mad {
        const NAME: &'static str = "mad";

        fn apply<C: ComputeFloat>(&self, [a, b, c]: [C; 3]) -> C {
            a * b + c
        }
    }

    fn run(config: &DispatchConfig) -> Vec<f32> {
        let a = Storage::F32((0..24).map(|i| i as f32 * 0.5).collect());
        let b = Storage::F16((0..4).map(|i| f16::from_f32(i as f32)).collect());
        let c = Storage::F64(vec![0.25]);
        let indexer = BroadcastIndexer::new([&[2, 3, 4][..], &[4][..], &[][..]], &[2, 3, 4]);
        let mut out = Storage::zeros(DType::F32, 24);
        fill(&Mad, DType::F32, [&a, &b, &c], &indexer, &mut out, config).unwrap();
        match out {
            Storage::F32(v) => v,
            _ => unreachable!(),
        }
    }

    #[test]
    fn ternary_rule_broadcasts() {
        let out = run(&DispatchConfig::sequential());
        for (i, &v) in out.iter().enumerate() {
            let expected = i as f32 * 0.5 * (i % 4) as f32 + 0.25;
            assert_eq!(v, expected, "position {i}");
        }
    }

    #[test]
    fn chunking_does_not_change_results() {
        let seq = run(&DispatchConfig::sequential());
        for chunk in [1, 3, 5, 7, 24, 100] {
            assert_eq!(run(&DispatchConfig::always_parallel(chunk)), seq, "chunk {chunk}");
        }
    }

    #[test]
    fn integer_output_is_rejected() {
        let a = Storage::F32(vec![1.0]);
        let indexer = BroadcastIndexer::new([&[1][..], &[1][..], &[1][..]], &[1]);
        let mut out = Storage::zeros(DType::I32, 1);
        let err = fill(&Mad, DType::F32, [&a, &a, &a], &indexer, &mut out, &DispatchConfig::default());
        assert_eq!(
            err,
            Err(Error::UnsupportedDType { op: "mad", dtype: DType::I32 })
        );
    }
}
