use crate::{decode, ComputeError, DebugRecord, ReduceOp, ReductionBindings};

/// Invocations per workgroup in `shaders/reduce.wgsl` (`@workgroup_size`).
pub const THREADS_PER_WORKGROUP: usize = 64;

/// Folds one workgroup's chunk in the same order as the shader: each lane
/// accumulates every `THREADS_PER_WORKGROUP`-th element, then the lanes are
/// combined pairwise in a tree.
fn reduce_chunk(op: ReduceOp, chunk: &[f32]) -> f32 {
    let mut lanes = [op.identity(); THREADS_PER_WORKGROUP];
    for (i, &value) in chunk.iter().enumerate() {
        let lane = i % THREADS_PER_WORKGROUP;
        lanes[lane] = op.combine(lanes[lane], value);
    }
    let mut width = THREADS_PER_WORKGROUP / 2;
    while width > 0 {
        for lane in 0..width {
            lanes[lane] = op.combine(lanes[lane], lanes[lane + width]);
        }
        width /= 2;
    }
    lanes[0]
}

/// Runs the reduction kernel on the host.
///
/// Workgroup `w` reads `input[w * stride .. min((w + 1) * stride, element_count)]`
/// and writes its partial to `output[w]`. A debug record is written only for
/// workgroups that fit in the debug slot; writes past the end of a slot are
/// dropped, matching the bounds checks in the shader.
pub fn handle_reduce(
    op: ReduceOp,
    bindings: &ReductionBindings,
    workgroups: [u32; 3],
) -> Result<Vec<Vec<u8>>, ComputeError> {
    let uniforms = bindings.uniforms()?;
    if uniforms.stride == 0 {
        return Err(ComputeError::InvalidInput("stride must be at least 1".into()));
    }
    let input: Vec<f32> = decode(&bindings.input().data);
    let mut output: Vec<f32> = decode(&bindings.output().data);
    let mut debug: Vec<DebugRecord> = decode(&bindings.debug().data);

    let available = input.len().min(uniforms.element_count as usize);
    let stride = uniforms.stride as usize;
    for workgroup in 0..workgroups[0] {
        let first = (workgroup as usize).saturating_mul(stride);
        let end = first.saturating_add(stride).min(available);
        let chunk = input.get(first..end).unwrap_or(&[]);
        let partial = reduce_chunk(op, chunk);

        if let Some(slot) = output.get_mut(workgroup as usize) {
            *slot = partial;
        }
        if let Some(record) = debug.get_mut(workgroup as usize) {
            *record = DebugRecord {
                workgroup_id: workgroup,
                first_index: u32::try_from(first).unwrap_or(u32::MAX),
                element_count: u32::try_from(chunk.len()).unwrap_or(u32::MAX),
                partial,
            };
        }
    }

    Ok(vec![
        bytemuck::cast_slice(&output).to_vec(),
        bytemuck::cast_slice(&debug).to_vec(),
    ])
}
