use compute::{layout::{Access, LAYOUT}, kernels::THREADS_PER_WORKGROUP, ReduceOp};
use std::fs;
use std::path::Path;

fn read_shader(relative: &str) -> String {
    let shader_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(relative);
    match fs::read_to_string(&shader_path) {
        Ok(s) => s,
        Err(e) => panic!("Failed to read shader file {shader_path:?}: {e}"),
    }
}

// Parses and validates a WGSL source with naga, panicking with a rendered report.
fn validate_wgsl_shader(shader_source: &str) -> naga::Module {
    let module = match naga::front::wgsl::parse_str(shader_source) {
        Ok(m) => m,
        Err(e) => {
            panic!(
                "WGSL parsing error:\n{error_report}",
                error_report = e.emit_to_string(shader_source)
            );
        }
    };

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );

    if let Err(e) = validator.validate(&module) {
        panic!(
            "WGSL validation error:\n{error_report}",
            error_report = e.emit_to_string(shader_source)
        );
    }
    module
}

#[test]
fn validate_reduce_shader_compiles() {
    let source = read_shader("../../shaders/reduce.wgsl");
    validate_wgsl_shader(&source);
}

#[test]
fn reduce_shader_bindings_match_layout() {
    let source = read_shader("../../shaders/reduce.wgsl");
    let module = validate_wgsl_shader(&source);

    let mut bound: Vec<(u32, bool, bool)> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            assert_eq!(binding.group, 0, "{:?} is outside group 0", var.name);
            let (uniform, writable) = match var.space {
                naga::AddressSpace::Uniform => (true, false),
                naga::AddressSpace::Storage { access } => {
                    (false, access.contains(naga::StorageAccess::STORE))
                }
                other => panic!("unexpected address space {other:?} for {:?}", var.name),
            };
            Some((binding.binding, uniform, writable))
        })
        .collect();
    bound.sort_by_key(|(slot, _, _)| *slot);

    let expected: Vec<(u32, bool, bool)> = LAYOUT
        .iter()
        .map(|slot| (slot.index(), slot.is_uniform(), slot.access() == Access::ReadWrite))
        .collect();
    assert_eq!(bound, expected);
}

#[test]
fn reduce_shader_exposes_every_op() {
    let source = read_shader("../../shaders/reduce.wgsl");
    let module = validate_wgsl_shader(&source);

    for op in ReduceOp::ALL {
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == op.entry_point())
            .unwrap_or_else(|| panic!("missing entry point {}", op.entry_point()));
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [THREADS_PER_WORKGROUP as u32, 1, 1]);
    }
}
