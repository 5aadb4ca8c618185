//! Fixed binding layout consumed by `shaders/reduce.wgsl`.
//!
//! The slot numbers must match the kernel bit-exactly. The layout is static:
//! every slot is bound on every dispatch, even when its contents are unused.

use crate::{plan::DispatchPlan, ComputeError};

pub const UNIFORMS: u32 = 0;
pub const INPUT: u32 = 1;
pub const OUTPUT: u32 = 2;
pub const DEBUG: u32 = 11; // debug records

const _: () = assert!(OUTPUT == 2 && DEBUG == 11);

/// Size in bytes of one reduced value (`f32`).
pub const VALUE_SIZE: usize = std::mem::size_of::<f32>();

/// Whether the kernel may write to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// One role of the reduction layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    Uniforms,
    Input,
    Output,
    Debug,
}

/// Every slot, in binding order.
pub const LAYOUT: [BindingSlot; 4] = [
    BindingSlot::Uniforms,
    BindingSlot::Input,
    BindingSlot::Output,
    BindingSlot::Debug,
];

impl BindingSlot {
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Uniforms => UNIFORMS,
            Self::Input => INPUT,
            Self::Output => OUTPUT,
            Self::Debug => DEBUG,
        }
    }

    #[must_use]
    pub const fn access(self) -> Access {
        match self {
            Self::Uniforms | Self::Input => Access::ReadOnly,
            Self::Output | Self::Debug => Access::ReadWrite,
        }
    }

    /// `true` for the uniform slot, `false` for storage slots.
    #[must_use]
    pub const fn is_uniform(self) -> bool {
        matches!(self, Self::Uniforms)
    }

    /// Granularity the slot's byte length must be a multiple of.
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            Self::Uniforms => std::mem::size_of::<crate::ReductionUniforms>(),
            Self::Input | Self::Output => VALUE_SIZE,
            Self::Debug => std::mem::size_of::<crate::DebugRecord>(),
        }
    }

    /// Minimum byte length for this slot under `plan`.
    ///
    /// The debug slot always needs at least one record so the static layout
    /// can be satisfied when debugging is off.
    #[must_use]
    pub fn required_bytes(self, element_count: u32, plan: &DispatchPlan, debug_enabled: bool) -> u64 {
        let elements = match self {
            Self::Uniforms => 1,
            Self::Input => u64::from(element_count),
            Self::Output => u64::from(plan.workgroup_count),
            Self::Debug if debug_enabled => u64::from(plan.workgroup_count),
            Self::Debug => 1,
        };
        elements * self.element_size() as u64
    }

    /// Checks a buffer of `actual` bytes against this slot's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::BufferSize`] naming the slot if the length is
    /// not a multiple of the element size or is below the required minimum.
    pub fn validate(
        self,
        actual: usize,
        element_count: u32,
        plan: &DispatchPlan,
        debug_enabled: bool,
    ) -> Result<(), ComputeError> {
        let required = self.required_bytes(element_count, plan, debug_enabled);
        let actual = actual as u64;
        if actual % self.element_size() as u64 != 0 || actual < required {
            return Err(ComputeError::BufferSize {
                slot: self.index(),
                required,
                actual,
            });
        }
        Ok(())
    }
}
