// Golden-master tests: the wgpu backend must agree with the host backend.

#[cfg(all(feature = "gpu", feature = "cpu"))]
mod wgpu_tests {
    use compute::{CpuBackend, ReduceConfig, ReduceOp, ReductionDispatcher, WgpuBackend};
    use std::sync::Arc;

    fn gpu() -> Option<Arc<WgpuBackend>> {
        match WgpuBackend::try_new() {
            Ok(backend) => Some(Arc::new(backend)),
            Err(e) => {
                eprintln!("Skipping GPU test, no usable adapter: {e}");
                None
            }
        }
    }

    fn run_reduce_test(op: ReduceOp, workgroup_size: u32, input: &[f32]) {
        let Some(gpu) = gpu() else { return };
        let config = ReduceConfig { op, workgroup_size };
        let cpu = ReductionDispatcher::new(Arc::new(CpuBackend::new()), config);
        let gpu = ReductionDispatcher::new(gpu, config);

        let expected = cpu.dispatch(input, true).unwrap();
        let actual = gpu.dispatch(input, true).unwrap();

        assert_eq!(expected.partials.len(), actual.partials.len(), "Mismatched number of partials");
        for (i, (e, a)) in expected.partials.iter().zip(&actual.partials).enumerate() {
            assert!((e - a).abs() <= 1e-3 * e.abs().max(1.0), "Mismatch in partial {i}: {e} vs {a}");
        }
        let expected_debug = expected.debug.unwrap();
        let actual_debug = actual.debug.unwrap();
        assert_eq!(expected_debug.len(), actual_debug.len());
        for (e, a) in expected_debug.iter().zip(&actual_debug) {
            assert_eq!((e.workgroup_id, e.first_index, e.element_count), (a.workgroup_id, a.first_index, a.element_count));
        }
    }

    #[test]
    fn test_reduce_sum_kernel() {
        let input: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        run_reduce_test(ReduceOp::Sum, 4, &input);
    }

    #[test]
    fn test_reduce_sum_wide_chunks() {
        let input: Vec<f32> = (0..5000).map(|v| (v % 13) as f32 * 0.5).collect();
        run_reduce_test(ReduceOp::Sum, 300, &input);
    }

    #[test]
    fn test_reduce_min_max_kernels() {
        let input: Vec<f32> = (0..777).map(|v| ((v * 37) % 101) as f32 - 50.0).collect();
        run_reduce_test(ReduceOp::Min, 64, &input);
        run_reduce_test(ReduceOp::Max, 64, &input);
    }

    #[test]
    fn test_debug_disabled_binds_single_record() {
        let Some(gpu) = gpu() else { return };
        let d = ReductionDispatcher::new(gpu, ReduceConfig { op: ReduceOp::Sum, workgroup_size: 4 });
        let out = d.dispatch(&[1.0; 12], false).unwrap();
        assert_eq!(out.partials, vec![4.0, 4.0, 4.0]);
        assert!(out.debug.is_none());
    }
}
