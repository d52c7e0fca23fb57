//! Integration tests for the fusion graph, executor, and cache

use kernr::dtype::DType;
use kernr::error::Error;
use kernr::fusion::{
    ExecuteOptions, ExprKind, Fusion, FusionExecutor, FusionExecutorCache, TensorId,
};
use kernr::harness::setup_broadcast;
use kernr::tensor::Tensor;

/// Depth-first search for the first node of a kind, starting at the outputs
fn find_node(fusion: &Fusion, kind: ExprKind) -> Option<TensorId> {
    fn visit(fusion: &Fusion, id: TensorId, kind: ExprKind) -> Option<TensorId> {
        if fusion.kind_of(id) == kind {
            return Some(id);
        }
        fusion
            .operands(id)
            .into_iter()
            .find_map(|src| visit(fusion, src, kind))
    }
    fusion
        .outputs()
        .iter()
        .find_map(|&out| visit(fusion, out, kind))
}

#[test]
fn test_same_case_compiles_to_same_output_signature() {
    let t0 = Tensor::zeros(&[6, 4], DType::F32);
    let t1 = Tensor::zeros(&[6], DType::F32);

    let fusion_a = setup_broadcast(DType::F32, 1).unwrap();
    let fusion_b = setup_broadcast(DType::F32, 1).unwrap();
    let exec_a = FusionExecutor::compile(&fusion_a, &[t0.clone(), t1.clone()]).unwrap();
    let exec_b = FusionExecutor::compile(&fusion_b, &[t0, t1]).unwrap();

    assert_eq!(exec_a.output_shape(), exec_b.output_shape());
    assert_eq!(exec_a.output_dtype(), exec_b.output_dtype());
    assert_eq!(exec_a.output_shape(), &[6, 4]);
    assert_eq!(exec_a.output_dtype(), DType::F32);
}

#[test]
fn test_broadcast_axis_flags_follow_request() {
    for axis in [0usize, 1] {
        let fusion = setup_broadcast(DType::F32, axis).unwrap();
        let bcast = find_node(&fusion, ExprKind::Broadcast).unwrap();
        let pattern = fusion.broadcast_pattern(bcast).unwrap();
        assert_eq!(pattern.len(), 2);
        assert!(pattern[axis], "axis {axis} must be flagged");
        assert!(!pattern[1 - axis], "axis {} must not be flagged", 1 - axis);
    }
}

#[test]
fn test_half_case_widens_and_narrows() {
    let fusion = setup_broadcast(DType::F16, 1).unwrap();

    let t0_data: Vec<half::f16> = (0..12)
        .map(|i| half::f16::from_f32(i as f32 * 0.25))
        .collect();
    let t1_data: Vec<half::f16> = (0..4).map(|i| half::f16::from_f32(i as f32 + 0.5)).collect();
    let t0 = Tensor::from_slice(&t0_data, &[4, 3]);
    let t1 = Tensor::from_slice(&t1_data, &[4]);

    let mut cache = FusionExecutorCache::new(fusion);
    let out = cache
        .run_with_inputs(&[t0, t1], &ExecuteOptions::default())
        .unwrap()
        .remove(0);

    // The narrow cast restores the input dtype; the shape is untouched.
    assert_eq!(out.dtype(), DType::F16);
    assert_eq!(out.shape(), &[4, 3]);

    // Compute widen-add-narrow by hand and compare bitwise.
    let expected: Vec<half::f16> = (0..12)
        .map(|i| {
            let a = t0_data[i].to_f32();
            let b = t1_data[i / 3].to_f32();
            half::f16::from_f32(a + b)
        })
        .collect();
    assert_eq!(out.to_vec::<half::f16>().unwrap(), expected);
}

#[test]
fn test_sub_and_mul_fuse() {
    // (a - b) * a, elementwise
    let mut fusion = Fusion::new();
    let a = fusion.make_tensor(1, DType::F64);
    let b = fusion.make_tensor(1, DType::F64);
    fusion.add_input(a).unwrap();
    fusion.add_input(b).unwrap();
    let d = fusion.sub(a, b).unwrap();
    let p = fusion.mul(d, a).unwrap();
    fusion.add_output(p).unwrap();

    let ta = Tensor::from_slice(&[5.0f64, 3.0, -1.0], &[3]);
    let tb = Tensor::from_slice(&[2.0f64, 4.0, -3.0], &[3]);
    let mut cache = FusionExecutorCache::new(fusion);
    let out = cache
        .run_with_inputs(&[ta, tb], &ExecuteOptions::default())
        .unwrap()
        .remove(0);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![15.0, -3.0, -2.0]);
}

#[test]
fn test_cache_keys_on_input_signature() {
    let fusion = setup_broadcast(DType::F32, 0).unwrap();
    let mut cache = FusionExecutorCache::new(fusion);
    let options = ExecuteOptions::default();

    let t0 = Tensor::zeros(&[8, 16], DType::F32);
    let t1 = Tensor::zeros(&[16], DType::F32);
    cache.run_with_inputs(&[t0.clone(), t1.clone()], &options).unwrap();
    assert_eq!(cache.compiled_count(), 1);
    assert!(cache.last_run_info().unwrap().compiled);

    cache.run_with_inputs(&[t0, t1], &options).unwrap();
    assert_eq!(cache.compiled_count(), 1);
    assert!(!cache.last_run_info().unwrap().compiled);

    let t0 = Tensor::zeros(&[2, 16], DType::F32);
    let t1 = Tensor::zeros(&[16], DType::F32);
    cache.run_with_inputs(&[t0, t1], &options).unwrap();
    assert_eq!(cache.compiled_count(), 2);
}

#[test]
fn test_unsupported_ladder_is_rejected() {
    // Broadcasting the result of a binary op falls outside the pointwise
    // ladder the executor compiles.
    let mut fusion = Fusion::new();
    let a = fusion.make_tensor(1, DType::F32);
    let b = fusion.make_tensor(1, DType::F32);
    fusion.add_input(a).unwrap();
    fusion.add_input(b).unwrap();
    let s = fusion.add(a, b).unwrap();
    let bc = fusion.broadcast(s, &[true, false]).unwrap();
    let c = fusion.make_tensor(2, DType::F32);
    fusion.add_input(c).unwrap();
    let out = fusion.add(bc, c).unwrap();
    fusion.add_output(out).unwrap();

    let ta = Tensor::zeros(&[4], DType::F32);
    let tb = Tensor::zeros(&[4], DType::F32);
    let tc = Tensor::zeros(&[2, 4], DType::F32);
    let err = FusionExecutor::compile(&fusion, &[ta, tb, tc]).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFusion { .. }));
}

#[test]
fn test_structural_shape_error_is_fatal_to_case() {
    // A rank-1 operand of extent 3 cannot bind the non-broadcast axis of a
    // [2, 4] tensor when broadcasting axis 1.
    let fusion = setup_broadcast(DType::F32, 1).unwrap();
    let t0 = Tensor::zeros(&[2, 4], DType::F32);
    let t1 = Tensor::zeros(&[3], DType::F32);
    let mut cache = FusionExecutorCache::new(fusion);
    let err = cache
        .run_with_inputs(&[t0, t1], &ExecuteOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_profile_and_kernel_time_are_per_call_options() {
    let fusion = setup_broadcast(DType::F32, 0).unwrap();
    let mut cache = FusionExecutorCache::new(fusion);
    let t0 = Tensor::zeros(&[32, 64], DType::F32);
    let t1 = Tensor::zeros(&[64], DType::F32);
    let inputs = [t0, t1];

    cache
        .run_with_inputs(&inputs, &ExecuteOptions::default())
        .unwrap();
    let info = cache.last_run_info().unwrap();
    assert!(info.pointwise_params.is_none());
    assert!(info.kernel_time.is_none());

    cache
        .run_with_inputs(
            &inputs,
            &ExecuteOptions {
                profile: true,
                measure_kernel_time: true,
            },
        )
        .unwrap();
    let info = cache.last_run_info().unwrap();
    let params = info.pointwise_params.as_ref().unwrap();
    assert_eq!(params.elements, 32 * 64);
    assert!(info.kernel_time.is_some());
}
