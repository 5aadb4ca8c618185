//! Host-side buffers bound to the reduction layout for one dispatch.

use crate::{
    layout::{BindingSlot, LAYOUT},
    plan::checked_element_count,
    ComputeError, DebugRecord, DispatchPlan, ReductionUniforms,
};
use std::sync::Arc;

/// Bytes bound to one slot of the layout.
#[derive(Clone, Debug)]
pub struct BufferBinding {
    pub slot: BindingSlot,
    pub data: Arc<[u8]>,
}

impl BufferBinding {
    #[must_use]
    pub fn new(slot: BindingSlot, data: Arc<[u8]>) -> Self {
        Self { slot, data }
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// The four buffers of one dispatch. Every slot is always present.
#[derive(Clone, Debug)]
pub struct ReductionBindings {
    uniforms: BufferBinding,
    input: BufferBinding,
    output: BufferBinding,
    debug: BufferBinding,
}

impl ReductionBindings {
    /// Wraps caller-allocated buffers, assigning each to its fixed slot.
    #[must_use]
    pub fn new(uniforms: Arc<[u8]>, input: Arc<[u8]>, output: Arc<[u8]>, debug: Arc<[u8]>) -> Self {
        Self {
            uniforms: BufferBinding::new(BindingSlot::Uniforms, uniforms),
            input: BufferBinding::new(BindingSlot::Input, input),
            output: BufferBinding::new(BindingSlot::Output, output),
            debug: BufferBinding::new(BindingSlot::Debug, debug),
        }
    }

    /// Allocates every slot at its minimum size for `plan`.
    ///
    /// Output starts zeroed. The debug slot holds one zeroed record unless
    /// `debug_enabled`, in which case it holds one record per workgroup.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidInput`] if `input` has more than
    /// `u32::MAX` elements, since the uniform slot could not describe it.
    pub fn allocate(input: &[f32], plan: &DispatchPlan, debug_enabled: bool) -> Result<Self, ComputeError> {
        let element_count = checked_element_count(input.len())?;
        let uniforms = ReductionUniforms::new(element_count, plan.workgroup_size);
        let zeroed = |slot: BindingSlot| -> Result<Arc<[u8]>, ComputeError> {
            let len = slot.required_bytes(element_count, plan, debug_enabled);
            let len = usize::try_from(len).map_err(|_| {
                ComputeError::InvalidInput(format!("slot {} needs {len} bytes", slot.index()))
            })?;
            Ok(vec![0u8; len].into())
        };
        Ok(Self::new(
            bytemuck::bytes_of(&uniforms).to_vec().into(),
            bytemuck::cast_slice(input).to_vec().into(),
            zeroed(BindingSlot::Output)?,
            zeroed(BindingSlot::Debug)?,
        ))
    }

    #[must_use]
    pub fn uniforms_binding(&self) -> &BufferBinding {
        &self.uniforms
    }

    #[must_use]
    pub fn input(&self) -> &BufferBinding {
        &self.input
    }

    #[must_use]
    pub fn output(&self) -> &BufferBinding {
        &self.output
    }

    #[must_use]
    pub fn debug(&self) -> &BufferBinding {
        &self.debug
    }

    /// Bindings in slot order: 0, 1, 2, 11.
    pub fn iter(&self) -> impl Iterator<Item = &BufferBinding> {
        [&self.uniforms, &self.input, &self.output, &self.debug].into_iter()
    }

    /// Number of debug records the debug slot can hold.
    #[must_use]
    pub fn debug_capacity(&self) -> usize {
        self.debug.byte_len() / std::mem::size_of::<DebugRecord>()
    }

    /// Reads the uniform struct from slot 0.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::BufferSize`] for slot 0 if it is shorter than
    /// one [`ReductionUniforms`].
    pub fn uniforms(&self) -> Result<ReductionUniforms, ComputeError> {
        let size = std::mem::size_of::<ReductionUniforms>();
        match self.uniforms.data.get(..size) {
            Some(bytes) => Ok(bytemuck::pod_read_unaligned(bytes)),
            None => Err(ComputeError::BufferSize {
                slot: BindingSlot::Uniforms.index(),
                required: size as u64,
                actual: self.uniforms.byte_len() as u64,
            }),
        }
    }

    /// Checks every slot against the layout, in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::BufferSize`] for the first offending slot.
    pub fn validate(
        &self,
        element_count: u32,
        plan: &DispatchPlan,
        debug_enabled: bool,
    ) -> Result<(), ComputeError> {
        debug_assert!(self.iter().map(|b| b.slot).eq(LAYOUT));
        for binding in self.iter() {
            binding
                .slot
                .validate(binding.byte_len(), element_count, plan, debug_enabled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sizes_each_slot() {
        let input = [1.0f32; 10];
        let plan = DispatchPlan::new(10, 4).unwrap();

        let off = ReductionBindings::allocate(&input, &plan, false).unwrap();
        assert_eq!(off.uniforms_binding().byte_len(), 16);
        assert_eq!(off.input().byte_len(), 40);
        assert_eq!(off.output().byte_len(), 12);
        assert_eq!(off.debug_capacity(), 1);
        assert!(off.validate(10, &plan, false).is_ok());

        let on = ReductionBindings::allocate(&input, &plan, true).unwrap();
        assert_eq!(on.debug_capacity(), 3);
        assert!(on.validate(10, &plan, true).is_ok());
    }

    #[test]
    fn uniforms_round_trip_through_slot_zero() {
        let plan = DispatchPlan::new(5, 2).unwrap();
        let bindings = ReductionBindings::allocate(&[0.0; 5], &plan, false).unwrap();
        assert_eq!(bindings.uniforms().unwrap(), ReductionUniforms::new(5, 2));
    }

    #[test]
    fn one_record_debug_fails_when_debug_requested() {
        let plan = DispatchPlan::new(10, 4).unwrap();
        let bindings = ReductionBindings::allocate(&[0.0; 10], &plan, false).unwrap();
        let err = bindings.validate(10, &plan, true).unwrap_err();
        assert!(matches!(err, ComputeError::BufferSize { slot: 11, required: 48, actual: 16 }));
    }

    #[test]
    fn short_uniform_slot_is_reported() {
        let bindings = ReductionBindings::new(
            vec![0u8; 8].into(),
            vec![0u8; 4].into(),
            vec![0u8; 4].into(),
            vec![0u8; 16].into(),
        );
        assert!(matches!(
            bindings.uniforms(),
            Err(ComputeError::BufferSize { slot: 0, required: 16, actual: 8 })
        ));
    }
}
