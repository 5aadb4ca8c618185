use crate::ComputeError;

/// Default number of input elements folded by one workgroup.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Converts an input length to the `u32` element count carried in the
/// uniform slot.
///
/// # Errors
///
/// Returns [`ComputeError::InvalidInput`] if `len` does not fit in a `u32`.
pub fn checked_element_count(len: usize) -> Result<u32, ComputeError> {
    u32::try_from(len).map_err(|_| {
        ComputeError::InvalidInput(format!("input of {len} elements exceeds u32 indexing"))
    })
}

/// Dispatch grid derived from an element count.
///
/// `workgroup_count` is also the number of partial results the dispatch
/// produces, one per workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub workgroup_count: u32,
    pub workgroup_size: u32,
}

impl DispatchPlan {
    /// `workgroup_count = max(1, ceil(element_count / workgroup_size))`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidInput`] for a zero workgroup size.
    pub fn new(element_count: u32, workgroup_size: u32) -> Result<Self, ComputeError> {
        if workgroup_size == 0 {
            return Err(ComputeError::InvalidInput(
                "workgroup size must be at least 1".into(),
            ));
        }
        Ok(Self {
            workgroup_count: element_count.div_ceil(workgroup_size).max(1),
            workgroup_size,
        })
    }

    #[must_use]
    pub const fn grid(&self) -> [u32; 3] {
        [self.workgroup_count, 1, 1]
    }
}
