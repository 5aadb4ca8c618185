#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Single-stage parallel reduction over a fixed four-slot binding layout.
//!
//! [`ReductionDispatcher`] turns a slice of `f32` values into one partial
//! result per workgroup using exactly one compute dispatch. It does not loop:
//! collapsing several partials into a scalar is done by the caller, by feeding
//! [`ReductionOutput::partials`] back in as the next input.
//!
//! Two backends implement [`ComputeBackend`]:
//!
//! - [`CpuBackend`] (feature `cpu`, on by default) runs the reference kernel
//!   on the host.
//! - [`WgpuBackend`] (feature `gpu`) runs `shaders/reduce.wgsl` on the
//!   default adapter.

use std::sync::Arc;
use thiserror::Error;

pub mod backend;
pub mod bindings;
#[cfg(feature = "cpu")]
pub mod cpu_backend;
pub mod dispatcher;
pub mod kernels;
pub mod layout;
pub mod plan;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use backend::{ComputeBackend, DeviceLimits};
pub use bindings::{BufferBinding, ReductionBindings};
#[cfg(feature = "cpu")]
pub use cpu_backend::CpuBackend;
pub use dispatcher::{ReduceConfig, ReductionDispatcher, ReductionOutput};
pub use layout::{Access, BindingSlot};
pub use plan::{DispatchPlan, DEFAULT_WORKGROUP_SIZE};
#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

#[cfg(not(any(feature = "cpu", feature = "gpu")))]
compile_error!("No compute backend available. Enable the `cpu` or `gpu` feature.");

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("buffer for slot {slot} is {actual} bytes, needs at least {required} in whole elements")]
    BufferSize { slot: u32, required: u64, actual: u64 },
    #[error("device error: {0}")]
    Device(String),
    #[error("backend not available")]
    BackendUnavailable,
}

/// Combining function applied inside each workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReduceOp {
    #[default]
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 3] = [ReduceOp::Sum, ReduceOp::Min, ReduceOp::Max];

    /// WGSL entry point implementing this op. Sum keeps the bootstrap's
    /// `reduceFromBuffer` name.
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Sum => "reduceFromBuffer",
            Self::Min => "reduceMinFromBuffer",
            Self::Max => "reduceMaxFromBuffer",
        }
    }

    /// Value that leaves any partial unchanged. Must agree with the shader.
    #[must_use]
    pub const fn identity(self) -> f32 {
        match self {
            Self::Sum => 0.0,
            Self::Min => f32::INFINITY,
            Self::Max => f32::NEG_INFINITY,
        }
    }

    #[must_use]
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Sum => a + b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

impl std::str::FromStr for ReduceOp {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(ComputeError::InvalidInput(format!(
                "unknown reduce op `{other}`, expected sum, min or max"
            ))),
        }
    }
}

/// Contents of the uniform slot. Padded to the 16-byte uniform alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReductionUniforms {
    pub element_count: u32,
    /// Input elements consumed per workgroup.
    pub stride: u32,
    _padding: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<ReductionUniforms>() == 16);

impl ReductionUniforms {
    #[must_use]
    pub const fn new(element_count: u32, stride: u32) -> Self {
        Self {
            element_count,
            stride,
            _padding: [0; 2],
        }
    }
}

/// Per-workgroup record the kernel writes into the debug slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugRecord {
    pub workgroup_id: u32,
    pub first_index: u32,
    pub element_count: u32,
    pub partial: f32,
}

const _: () = assert!(std::mem::size_of::<DebugRecord>() == 16);

/// Decodes a little-endian byte buffer read back from a slot.
///
/// Readback buffers carry no alignment guarantee, so elements are copied out
/// one at a time.
#[must_use]
pub fn decode<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Returns a compute backend, preferring the GPU.
///
/// With the `gpu` feature enabled this attempts to create a [`WgpuBackend`].
/// If that fails and the `cpu` feature is enabled, a [`CpuBackend`] is
/// returned instead.
///
/// # Errors
///
/// Returns the GPU initialisation error when no CPU fallback is compiled in.
pub fn default_backend() -> Result<Arc<dyn ComputeBackend>, ComputeError> {
    #[cfg(feature = "gpu")]
    let gpu_error = match WgpuBackend::try_new() {
        Ok(gpu) => {
            tracing::info!("Using WgpuBackend.");
            return Ok(Arc::new(gpu));
        }
        Err(e) => e,
    };

    #[cfg(feature = "cpu")]
    {
        #[cfg(feature = "gpu")]
        tracing::warn!("WgpuBackend initialization failed ({gpu_error}), falling back...");
        tracing::info!("Using CpuBackend.");
        return Ok(Arc::new(CpuBackend::new()));
    }

    #[cfg(not(feature = "cpu"))]
    return Err(gpu_error);
}
