use batch_compute::engine::config::{parse_backends, parse_power_preference};
use batch_compute::{
    reflect_kernels, BufferKind, CompilationError, ComputeError, EngineConfig,
    FunctionNotFoundError, GridShape, RuntimeError, StorageMode,
};

const TWO_KERNELS: &str = r#"
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read> scale: f32;

@compute @workgroup_size(64)
fn A(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&a)) {
        a[id.x] = a[id.x] * 2.0;
    }
}

@compute @workgroup_size(8, 8)
fn B(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&b)) {
        b[id.x] = b[id.x] * scale;
    }
}
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Buffer kinds
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn storage_modes_per_kind() {
    assert_eq!(BufferKind::In.storage_mode(), StorageMode::Managed);
    assert_eq!(BufferKind::Out.storage_mode(), StorageMode::Managed);
    assert_eq!(BufferKind::InOut.storage_mode(), StorageMode::Managed);
    assert_eq!(BufferKind::Private.storage_mode(), StorageMode::Private);
    assert_eq!(BufferKind::Shared.storage_mode(), StorageMode::Shared);
}

#[test]
fn only_writable_host_kinds_copy_back() {
    let copied: Vec<BufferKind> =
        BufferKind::ALL.into_iter().filter(|k| k.copies_back()).collect();
    assert_eq!(copied, vec![BufferKind::Out, BufferKind::InOut, BufferKind::Shared]);

    assert!(!BufferKind::Private.has_host_mirror());
    assert!(BufferKind::ALL.iter().filter(|&&k| k != BufferKind::Private).all(|k| k.has_host_mirror()));
    assert!(!BufferKind::In.is_writable());
}

#[test]
fn shared_needs_a_transfer_only_without_mappable_storage() {
    assert!(BufferKind::Out.needs_transfer(true));
    assert!(BufferKind::InOut.needs_transfer(true));
    assert!(!BufferKind::Shared.needs_transfer(true));
    assert!(BufferKind::Shared.needs_transfer(false));
    assert!(!BufferKind::In.needs_transfer(false));
    assert!(!BufferKind::Private.needs_transfer(false));
}

#[test]
fn kind_names() {
    let names: Vec<String> = BufferKind::ALL.iter().map(|k| k.to_string()).collect();
    assert_eq!(names, ["in", "out", "inout", "private", "shared"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn grid_is_reported_x_first() {
    let grid = GridShape::new(4, 10, 2, 5);
    assert_eq!(grid.grid_extent(), [10, 4, 1]);
    assert_eq!(grid.workgroup_extent(), [5, 2, 1]);
    assert_eq!(grid.workgroup_counts(), Some([2, 2, 1]));
}

#[test]
fn partial_workgroups_round_up() {
    assert_eq!(GridShape::new(1, 10, 1, 4).workgroup_counts(), Some([3, 1, 1]));
    assert_eq!(GridShape::new(7, 9, 8, 8).workgroup_counts(), Some([2, 1, 1]));
    assert_eq!(GridShape::new(0, 0, 1, 1).workgroup_counts(), Some([0, 0, 1]));
}

#[test]
fn zero_workgroup_dimensions_are_rejected() {
    assert_eq!(GridShape::new(4, 4, 0, 4).workgroup_counts(), None);
    assert_eq!(GridShape::new(4, 4, 4, 0).workgroup_counts(), None);
}

#[test]
fn grid_display_uses_row_column_naming() {
    assert_eq!(GridShape::new(3, 5, 1, 5).to_string(), "grid 3x5 (workgroup 1x5)");
}

// ─────────────────────────────────────────────────────────────────────────────
// Kernel reflection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reflection_lists_compute_kernels_and_used_bindings() {
    let kernels = reflect_kernels(TWO_KERNELS).expect("valid WGSL");
    assert_eq!(kernels.len(), 2);

    let a = kernels.iter().find(|k| k.name == "A").unwrap();
    assert_eq!(a.workgroup_size, [64, 1, 1]);
    assert_eq!(a.bindings, vec![0]);
    assert_eq!(a.required_slots(), 1);

    let b = kernels.iter().find(|k| k.name == "B").unwrap();
    assert_eq!(b.workgroup_size, [8, 8, 1]);
    assert_eq!(b.bindings, vec![1, 2]);
    assert_eq!(b.required_slots(), 3);

    assert!(!kernels.iter().any(|k| k.name == "C"));
}

#[test]
fn kernels_without_bindings_need_no_slots() {
    let kernels = reflect_kernels(
        "@compute @workgroup_size(1) fn noop(@builtin(global_invocation_id) id: vec3<u32>) {}",
    )
    .unwrap();
    assert_eq!(kernels[0].required_slots(), 0);
}

#[test]
fn non_compute_entry_points_are_not_kernels() {
    let source = r#"
@vertex
fn vs() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }

@compute @workgroup_size(1)
fn cs() {}
"#;
    let names: Vec<String> = reflect_kernels(source).unwrap().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["cs".to_string()]);
}

#[test]
fn syntax_errors_carry_a_diagnostic() {
    let err = reflect_kernels("@compute @workgroup_size(1) fn broken( {").unwrap_err();
    assert!(!err.diagnostic.is_empty());
}

#[test]
fn type_errors_are_compilation_errors() {
    let source = r#"
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@compute @workgroup_size(1)
fn bad() { a[0] = vec2<f32>(1.0, 2.0); }
"#;
    assert!(reflect_kernels(source).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors and configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn errors_convert_into_the_aggregate() {
    let e: ComputeError = CompilationError::new("expected ')'").into();
    assert!(e.is_compilation());
    assert!(e.to_string().contains("expected ')'"));

    let e: ComputeError = FunctionNotFoundError::Missing { name: "C".into() }.into();
    assert!(e.is_function_not_found());
    assert_eq!(e.to_string(), "function not found: C");

    let e: ComputeError = RuntimeError::InvalidGrid { grid: GridShape::new(1, 1, 0, 1) }.into();
    assert!(e.is_runtime());
    assert!(std::error::Error::source(&e).is_some());
}

#[test]
fn function_not_found_reports_the_name() {
    let e = FunctionNotFoundError::PipelineFailed { name: "k".into(), message: "bad layout".into() };
    assert_eq!(e.name(), "k");
    assert!(e.to_string().contains("bad layout"));
}

#[test]
fn backend_lists_parse() {
    assert_eq!(parse_backends("vulkan"), Some(wgpu::Backends::VULKAN));
    assert_eq!(
        parse_backends(" Vulkan , metal "),
        Some(wgpu::Backends::VULKAN | wgpu::Backends::METAL)
    );
    assert_eq!(parse_backends("all"), Some(wgpu::Backends::all()));
    assert_eq!(parse_backends("quantum"), None);
    assert_eq!(parse_backends(""), None);
}

#[test]
fn power_preferences_parse() {
    assert_eq!(parse_power_preference("low"), Some(wgpu::PowerPreference::LowPower));
    assert_eq!(parse_power_preference("HIGH"), Some(wgpu::PowerPreference::HighPerformance));
    assert_eq!(parse_power_preference("none"), Some(wgpu::PowerPreference::None));
    assert_eq!(parse_power_preference("fast"), None);
}

#[test]
fn config_builders_override_defaults() {
    let config = EngineConfig::default()
        .with_backends(wgpu::Backends::GL)
        .with_power_preference(wgpu::PowerPreference::LowPower)
        .with_fallback_adapter(true)
        .with_label("tests");

    assert_eq!(config.backends, wgpu::Backends::GL);
    assert_eq!(config.power_preference, wgpu::PowerPreference::LowPower);
    assert!(config.force_fallback_adapter);
    assert_eq!(config.label, "tests");
}
