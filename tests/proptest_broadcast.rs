//! Property tests for broadcasting, promotion, and executor determinism.

use briny_fused::ops::silu_and_mul::silu_and_mul_with;
use briny_fused::promotion::promote;
use briny_fused::shape::{broadcast_shapes, numel};
use briny_fused::*;
use proptest::prelude::*;

fn dim() -> impl Strategy<Value = usize> {
    1usize..=6
}

/// A target shape and a second shape that broadcasts to it.
fn broadcastable_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec(dim(), 0..=4).prop_flat_map(|target| {
        let len = target.len();
        (0..=len, prop::collection::vec(prop::bool::ANY, len), Just(target)).prop_map(
            |(skip, keep, t)| {
                // drop leading dims and collapse some of the rest to 1
                let a: Vec<usize> = t[skip..]
                    .iter()
                    .zip(&keep[skip..])
                    .map(|(&d, &k)| if k { d } else { 1 })
                    .collect();
                (a, t)
            },
        )
    })
}

fn float_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::F16),
        Just(DType::BF16),
        Just(DType::F32),
        Just(DType::F64),
    ]
}

/// Row-major offset into `src` of output position `i` of a broadcast to `out`.
fn source_index(mut i: usize, src: &[usize], out: &[usize]) -> usize {
    let offset = out.len() - src.len();
    let (mut index, mut stride) = (0, 1);
    for d in (0..out.len()).rev() {
        let coord = i % out[d];
        i /= out[d];
        if d >= offset && src[d - offset] != 1 {
            index += coord * stride;
        }
        if d >= offset {
            stride *= src[d - offset];
        }
    }
    index
}

fn values(len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-20.0f32..20.0, len)
}

proptest! {
    #[test]
    fn broadcast_is_symmetric((a, t) in broadcastable_pair()) {
        prop_assert_eq!(broadcast_shapes(&a, &t), Some(t.clone()));
        prop_assert_eq!(broadcast_shapes(&t, &a), Some(t));
    }

    #[test]
    fn promotion_is_commutative(a in float_dtype(), b in float_dtype()) {
        let out = promote(a, b);
        prop_assert_eq!(out, promote(b, a));
        prop_assert!(out.is_float());
        prop_assert!(out.size_in_bytes() >= a.size_in_bytes().max(b.size_in_bytes()));
    }

    #[test]
    fn output_takes_broadcast_shape(
        ((a_shape, b_shape), a_data, b_data) in broadcastable_pair().prop_flat_map(|(a, t)| {
            let (na, nt) = (numel(&a), numel(&t));
            (Just((a, t)), values(na), values(nt))
        })
    ) {
        let a = Tensor::new(a_shape.clone(), a_data.clone());
        let b = Tensor::new(b_shape.clone(), b_data);
        let out = silu_and_mul(&a, &b).unwrap();
        prop_assert_eq!(&out.shape, &b_shape);
        prop_assert_eq!(out.numel(), numel(&b_shape));

        let flipped = silu_and_mul(&b, &a).unwrap();
        prop_assert_eq!(&flipped.shape, &b_shape);

        // multiplying by ones leaves silu(a) broadcast across the output
        let ones = Tensor::new(b_shape.clone(), vec![1.0f32; numel(&b_shape)]);
        let silu = silu_and_mul(&a, &ones).unwrap();
        for (i, v) in silu.data::<f32>().unwrap().iter().enumerate() {
            let x = a_data[source_index(i, &a_shape, &b_shape)];
            prop_assert_eq!(*v, x / (1.0 + (-x).exp()));
        }
    }

    #[test]
    fn chunking_never_changes_results(
        rows in 1usize..40,
        cols in 1usize..40,
        chunk in 1usize..200,
        seed in any::<u64>(),
    ) {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let a: Vec<f32> = (0..rows).map(|_| rng.random_range(-10.0f32..10.0)).collect();
        let b: Vec<f32> = (0..rows * cols).map(|_| rng.random_range(-10.0f32..10.0)).collect();
        let a = Tensor::new(vec![rows, 1], a);
        let b = Tensor::new(vec![rows, cols], b);

        let seq = silu_and_mul_with(&Dispatcher::new(DispatchConfig::sequential()), &a, &b).unwrap();
        let par = silu_and_mul_with(&Dispatcher::new(DispatchConfig::always_parallel(chunk)), &a, &b).unwrap();
        prop_assert_eq!(seq, par);
    }
}
