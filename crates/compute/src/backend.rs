use crate::{ComputeError, ReduceOp, ReductionBindings};

/// Device limits the dispatcher checks before submitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_storage_buffer_binding_size: u64,
    pub max_workgroups_per_dimension: u32,
}

impl Default for DeviceLimits {
    /// The WebGPU default limits.
    fn default() -> Self {
        Self {
            max_storage_buffer_binding_size: 128 << 20,
            max_workgroups_per_dimension: 65_535,
        }
    }
}

pub trait ComputeBackend: Send + Sync + 'static {
    /// Limits of the device this backend submits to.
    fn limits(&self) -> DeviceLimits;

    /// Dispatches the reduction kernel for `op` once over `bindings`.
    ///
    /// # Arguments
    /// * `op`: Selects the kernel entry point.
    /// * `bindings`: All four slots of the reduction layout, already validated.
    /// * `workgroups`: The dispatch grid.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Vec<Vec<u8>>)` with the bytes of every read-write slot after
    /// the dispatch, in slot order: output (2) first, then debug (11).
    /// Failures of the underlying device are reported as
    /// `ComputeError::Device` and are never retried.
    fn dispatch(
        &self,
        op: ReduceOp,
        bindings: &ReductionBindings,
        workgroups: [u32; 3],
    ) -> Result<Vec<Vec<u8>>, ComputeError>;
}
