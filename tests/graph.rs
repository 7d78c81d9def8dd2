use briny_fused::*;

fn vector(data: &[f64]) -> Tensor {
    Tensor::new(vec![data.len()], data.to_vec())
}

#[test]
fn test_silu_and_mul_forward_in_graph() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[0.0, 1.0]));
    let b = g.leaf(vector(&[2.0, 2.0]));
    let c = g.silu_and_mul(a, b).unwrap();

    assert_eq!(g.op(c), "silu_and_mul");
    assert!(!g.is_differentiable(c));
    let direct = silu_and_mul(g.value(a), g.value(b)).unwrap();
    assert_eq!(g.value(c), &direct);
}

#[test]
fn test_backward_through_silu_and_mul_fails() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[0.5, -0.5]));
    let b = g.leaf(vector(&[1.0, 2.0]));
    let c = g.silu_and_mul(a, b).unwrap();

    let err = g.backward(c, vector(&[1.0, 1.0])).unwrap_err();
    assert_eq!(err, Error::NoGradientDefined { op: "silu_and_mul" });
}

#[test]
fn test_backward_fails_when_forward_only_node_is_upstream() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[0.5, -0.5]));
    let b = g.leaf(vector(&[1.0, 2.0]));
    let c = g.silu_and_mul(a, b).unwrap();
    let d = g.mul(c, b).unwrap();

    assert_eq!(
        g.backward(d, vector(&[1.0, 1.0])).unwrap_err(),
        Error::NoGradientDefined { op: "silu_and_mul" }
    );
}

#[test]
fn test_forward_only_node_off_the_path() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[1.0, 2.0]));
    let b = g.leaf(vector(&[3.0, 4.0]));
    let _unused = g.silu_and_mul(a, b).unwrap();
    let c = g.add(a, b).unwrap();

    let grads = g.backward(c, vector(&[1.0, 1.0])).unwrap();
    assert_eq!(grads.get(a).unwrap().data::<f64>(), Some(&[1.0, 1.0][..]));
    assert_eq!(grads.get(b).unwrap().data::<f64>(), Some(&[1.0, 1.0][..]));
}

#[test]
fn test_failed_forward_records_nothing() {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::zeros(vec![3, 4], DType::F32));
    let b = g.leaf(Tensor::zeros(vec![5, 4], DType::F32));
    assert!(matches!(g.silu_and_mul(a, b), Err(Error::ShapeMismatch { .. })));
    assert_eq!(g.len(), 2);
}

#[test]
fn test_mul_gradients() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[2.0, 3.0]));
    let b = g.leaf(vector(&[5.0, 7.0]));
    let c = g.mul(a, b).unwrap();

    let grads = g.backward(c, vector(&[1.0, 2.0])).unwrap();
    assert_eq!(grads.len(), 2);
    assert_eq!(grads.get(a).unwrap().data::<f64>(), Some(&[5.0, 14.0][..]));
    assert_eq!(grads.get(b).unwrap().data::<f64>(), Some(&[2.0, 6.0][..]));
}

#[test]
fn test_broadcast_gradient_is_summed() {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::new(vec![2, 1], vec![1.0f64, 2.0]));
    let b = g.leaf(Tensor::new(vec![2, 3], vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]));
    let c = g.mul(a, b).unwrap();

    let grads = g.backward(c, Tensor::new(vec![2, 3], vec![1.0f64; 6])).unwrap();
    let ga = grads.get(a).unwrap();
    assert_eq!(ga.shape, vec![2, 1]);
    assert_eq!(ga.data::<f64>(), Some(&[6.0, 15.0][..]));
    assert_eq!(
        grads.get(b).unwrap().data::<f64>(),
        Some(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0][..])
    );
}

#[test]
fn test_reused_variable_accumulates() {
    // y = a * a + a
    let mut g = Graph::new();
    let a = g.leaf(vector(&[3.0]));
    let sq = g.mul(a, a).unwrap();
    let y = g.add(sq, a).unwrap();

    let grads = g.backward(y, vector(&[1.0])).unwrap();
    assert_eq!(grads.get(a).unwrap().data::<f64>(), Some(&[7.0][..]));
}

#[test]
fn test_unreached_leaf_has_no_gradient() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[1.0]));
    let b = g.leaf(vector(&[2.0]));
    let c = g.add(a, a).unwrap();

    let grads = g.backward(c, vector(&[1.0])).unwrap();
    assert_eq!(grads.get(a).unwrap().data::<f64>(), Some(&[2.0][..]));
    assert!(grads.get(b).is_none());
}

#[test]
fn test_seed_shape_must_match_root() {
    let mut g = Graph::new();
    let a = g.leaf(vector(&[1.0, 2.0]));
    let b = g.leaf(vector(&[3.0, 4.0]));
    let c = g.add(a, b).unwrap();

    assert_eq!(
        g.backward(c, vector(&[1.0])).unwrap_err(),
        Error::ShapeMismatch {
            op: "backward",
            shapes: vec![vec![1], vec![2]],
        }
    );
}
