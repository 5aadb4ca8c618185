//! One-shot reduction dispatch.
//!
//! The dispatcher sizes the grid, checks every binding against the layout and
//! the device limits, then issues exactly one dispatch. It never reduces the
//! partials further: a dispatch over more than one workgroup returns one
//! partial per workgroup, and the caller re-invokes with those partials as the
//! new input if it wants a scalar.

use crate::{
    decode, layout::BindingSlot, plan::checked_element_count, ComputeBackend, ComputeError, DebugRecord, DispatchPlan,
    ReduceOp, ReductionBindings, DEFAULT_WORKGROUP_SIZE,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceConfig {
    pub op: ReduceOp,
    /// Input elements folded by each workgroup.
    pub workgroup_size: u32,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            op: ReduceOp::Sum,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
        }
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionOutput {
    /// One partial result per workgroup.
    pub partials: Vec<f32>,
    /// One record per workgroup, present only when debugging was requested.
    pub debug: Option<Vec<DebugRecord>>,
}

impl ReductionOutput {
    /// `true` once the reduction has collapsed to a single value.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.partials.len() == 1
    }
}

pub struct ReductionDispatcher {
    backend: Arc<dyn ComputeBackend>,
    config: ReduceConfig,
}

impl ReductionDispatcher {
    #[must_use]
    pub fn new(backend: Arc<dyn ComputeBackend>, config: ReduceConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn config(&self) -> ReduceConfig {
        self.config
    }

    /// Grid for an input of `len` elements under this dispatcher's config.
    ///
    /// # Errors
    ///
    /// [`ComputeError::InvalidInput`] for an empty input, an input longer than
    /// `u32::MAX` elements, or a zero workgroup size.
    pub fn plan(&self, len: usize) -> Result<DispatchPlan, ComputeError> {
        if len == 0 {
            return Err(ComputeError::InvalidInput("input must not be empty".into()));
        }
        DispatchPlan::new(checked_element_count(len)?, self.config.workgroup_size)
    }

    /// Reduces `input` with one dispatch.
    ///
    /// Returns one partial per workgroup. With `debug_enabled` the debug slot
    /// is sized to one record per workgroup and read back; otherwise a single
    /// zeroed record is bound to keep the layout complete and no debug data is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`ComputeError::InvalidInput`] for empty input or a plan that exceeds
    ///   the device limits. Nothing is allocated or dispatched.
    /// - [`ComputeError::BufferSize`] if a binding is too small for its role.
    /// - [`ComputeError::Device`] propagated unchanged from the backend.
    pub fn dispatch(&self, input: &[f32], debug_enabled: bool) -> Result<ReductionOutput, ComputeError> {
        let plan = self.plan(input.len())?;
        let element_count = checked_element_count(input.len())?;
        self.check_limits(&plan, [
            (BindingSlot::Input, BindingSlot::Input.required_bytes(element_count, &plan, debug_enabled)),
            (BindingSlot::Output, BindingSlot::Output.required_bytes(element_count, &plan, debug_enabled)),
            (BindingSlot::Debug, BindingSlot::Debug.required_bytes(element_count, &plan, debug_enabled)),
        ])?;
        let bindings = ReductionBindings::allocate(input, &plan, debug_enabled)?;
        self.submit(&bindings, element_count, &plan, debug_enabled)
    }

    /// Dispatches over caller-allocated bindings.
    ///
    /// The element count and stride come from the uniform slot. All bindings
    /// are validated before anything is submitted.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispatch`]; a zero element count in the uniforms is an
    /// [`ComputeError::InvalidInput`].
    pub fn dispatch_bound(
        &self,
        bindings: &ReductionBindings,
        debug_enabled: bool,
    ) -> Result<ReductionOutput, ComputeError> {
        let uniforms = bindings.uniforms()?;
        if uniforms.element_count == 0 {
            return Err(ComputeError::InvalidInput("input must not be empty".into()));
        }
        let plan = DispatchPlan::new(uniforms.element_count, uniforms.stride)?;
        self.check_limits(&plan, [
            (BindingSlot::Input, bindings.input().byte_len() as u64),
            (BindingSlot::Output, bindings.output().byte_len() as u64),
            (BindingSlot::Debug, bindings.debug().byte_len() as u64),
        ])?;
        self.submit(bindings, uniforms.element_count, &plan, debug_enabled)
    }

    fn check_limits(
        &self,
        plan: &DispatchPlan,
        storage: [(BindingSlot, u64); 3],
    ) -> Result<(), ComputeError> {
        let limits = self.backend.limits();
        if plan.workgroup_count > limits.max_workgroups_per_dimension {
            return Err(ComputeError::InvalidInput(format!(
                "{} workgroups exceed the device maximum of {}",
                plan.workgroup_count, limits.max_workgroups_per_dimension
            )));
        }
        for (slot, bytes) in storage {
            if bytes > limits.max_storage_buffer_binding_size {
                return Err(ComputeError::InvalidInput(format!(
                    "slot {} needs {bytes} bytes, device binding limit is {}",
                    slot.index(),
                    limits.max_storage_buffer_binding_size
                )));
            }
        }
        Ok(())
    }

    fn submit(
        &self,
        bindings: &ReductionBindings,
        element_count: u32,
        plan: &DispatchPlan,
        debug_enabled: bool,
    ) -> Result<ReductionOutput, ComputeError> {
        bindings.validate(element_count, plan, debug_enabled)?;
        debug!(
            op = ?self.config.op,
            element_count,
            workgroup_count = plan.workgroup_count,
            workgroup_size = plan.workgroup_size,
            debug_enabled,
            "dispatching reduction"
        );

        let mut written = self
            .backend
            .dispatch(self.config.op, bindings, plan.grid())?
            .into_iter();
        let wanted = plan.workgroup_count as usize;

        let output = written
            .next()
            .ok_or_else(|| ComputeError::Device("backend returned no output slot".into()))?;
        let partials = take_exact::<f32>(&output, wanted, BindingSlot::Output)?;

        let debug = if debug_enabled {
            let records = written
                .next()
                .ok_or_else(|| ComputeError::Device("backend returned no debug slot".into()))?;
            Some(take_exact::<DebugRecord>(&records, wanted, BindingSlot::Debug)?)
        } else {
            None
        };

        Ok(ReductionOutput { partials, debug })
    }
}

/// Decodes the first `wanted` elements of a read-back slot.
fn take_exact<T: bytemuck::Pod>(bytes: &[u8], wanted: usize, slot: BindingSlot) -> Result<Vec<T>, ComputeError> {
    let mut values: Vec<T> = decode(bytes);
    if values.len() < wanted {
        return Err(ComputeError::Device(format!(
            "slot {} read back {} elements, expected {wanted}",
            slot.index(),
            values.len()
        )));
    }
    values.truncate(wanted);
    Ok(values)
}
