use crate::{kernels, ComputeBackend, ComputeError, DeviceLimits, ReduceOp, ReductionBindings};

/// Host reference backend. Produces the same partials as the GPU kernel and
/// reports the WebGPU default limits.
#[derive(Default, Debug, Clone)]
pub struct CpuBackend {
    limits: DeviceLimits,
}

impl CpuBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend reporting custom limits, for exercising limit checks.
    #[must_use]
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self { limits }
    }
}

impl ComputeBackend for CpuBackend {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn dispatch(
        &self,
        op: ReduceOp,
        bindings: &ReductionBindings,
        workgroups: [u32; 3],
    ) -> Result<Vec<Vec<u8>>, ComputeError> {
        tracing::trace!(?op, ?workgroups, "CpuBackend dispatch");
        kernels::handle_reduce(op, bindings, workgroups)
    }
}
