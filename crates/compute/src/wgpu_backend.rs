//! GPU implementation of [`ComputeBackend`] built on [`wgpu`].
//!
//! The backend compiles `shaders/reduce.wgsl` once, builds the fixed
//! `reduceBuffer` bind-group layout (slots 0, 1, 2 and 11) and one compute
//! pipeline per [`ReduceOp`]. Each dispatch uploads the bindings, records a
//! single compute pass, copies the writable slots to staging buffers, submits,
//! and maps the staging buffers back. Initialization fails if no compatible
//! adapter is found.

use crate::{
    layout::{Access, LAYOUT},
    ComputeBackend, ComputeError, DeviceLimits, ReduceOp, ReductionBindings,
};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const SHADER_SOURCE: &str = include_str!("../../../shaders/reduce.wgsl");
const LABEL: &str = "reduceBuffer";

pub struct WgpuBackend {
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<ReduceOp, wgpu::ComputePipeline>,
    limits: DeviceLimits,
}

impl WgpuBackend {
    /// Acquires the default adapter and device and builds every pipeline.
    ///
    /// `WGPU_BACKEND` and `WGPU_ADAPTER_NAME` override backend and adapter
    /// selection.
    ///
    /// # Errors
    ///
    /// [`ComputeError::BackendUnavailable`] if no adapter or device can be
    /// acquired, [`ComputeError::Device`] if the shader or pipelines fail
    /// validation.
    pub fn try_new() -> Result<Self, ComputeError> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or_else(wgpu::Backends::all);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let adapter = pollster::block_on(wgpu::util::initialize_adapter_from_env_or_default(
            &instance, None,
        ))
        .ok_or(ComputeError::BackendUnavailable)?;
        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "Selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("reduce-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|err| {
            tracing::error!("Failed to request device: {err}");
            ComputeError::BackendUnavailable
        })?;
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!("Uncaptured wgpu error: {err}");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(LABEL),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = LAYOUT
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.index(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: if slot.is_uniform() {
                        wgpu::BufferBindingType::Uniform
                    } else {
                        wgpu::BufferBindingType::Storage {
                            read_only: slot.access() == Access::ReadOnly,
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(LABEL),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(LABEL),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = ReduceOp::ALL
            .into_iter()
            .map(|op| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(LABEL),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: op.entry_point(),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                });
                (op, pipeline)
            })
            .collect();

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ComputeError::Device(format!("pipeline creation failed: {err}")));
        }

        let device_limits = device.limits();
        let limits = DeviceLimits {
            max_storage_buffer_binding_size: u64::from(device_limits.max_storage_buffer_binding_size),
            max_workgroups_per_dimension: device_limits.max_compute_workgroups_per_dimension,
        };

        Ok(Self {
            adapter_info,
            device,
            queue,
            bind_group_layout,
            pipelines,
            limits,
        })
    }

    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn read_back(&self, staging: &[wgpu::Buffer]) -> Result<Vec<Vec<u8>>, ComputeError> {
        let mut results = Vec::with_capacity(staging.len());
        for buffer in staging {
            let buffer_slice = buffer.slice(..);
            let (tx, rx) = std::sync::mpsc::channel();
            buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            self.device.poll(wgpu::Maintain::Wait);
            rx.recv()
                .map_err(|err| ComputeError::Device(format!("map callback dropped: {err}")))?
                .map_err(|err| ComputeError::Device(format!("buffer map failed: {err}")))?;
            results.push(buffer_slice.get_mapped_range().to_vec());
            buffer.unmap();
        }
        Ok(results)
    }
}

impl ComputeBackend for WgpuBackend {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn dispatch(
        &self,
        op: ReduceOp,
        bindings: &ReductionBindings,
        workgroups: [u32; 3],
    ) -> Result<Vec<Vec<u8>>, ComputeError> {
        let pipeline = self
            .pipelines
            .get(&op)
            .ok_or(ComputeError::BackendUnavailable)?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let gpu_buffers: Vec<wgpu::Buffer> = bindings
            .iter()
            .map(|binding| {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{LABEL} slot {}", binding.slot.index())),
                        contents: &binding.data,
                        usage: if binding.slot.is_uniform() {
                            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
                        } else {
                            wgpu::BufferUsages::STORAGE
                                | wgpu::BufferUsages::COPY_DST
                                | wgpu::BufferUsages::COPY_SRC
                        },
                    })
            })
            .collect();

        let bind_group_entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .zip(&gpu_buffers)
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding.slot.index(),
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(LABEL),
            layout: &self.bind_group_layout,
            entries: &bind_group_entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(LABEL) });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(LABEL),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }

        let mut staging_buffers = Vec::new();
        for (binding, buffer) in bindings.iter().zip(&gpu_buffers) {
            if binding.slot.access() == Access::ReadWrite {
                let size = binding.byte_len() as u64;
                let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{LABEL} staging {}", binding.slot.index())),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
                staging_buffers.push(staging_buffer);
            }
        }

        self.queue.submit(Some(encoder.finish()));

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(ComputeError::Device(err.to_string()));
        }

        self.read_back(&staging_buffers)
    }
}
