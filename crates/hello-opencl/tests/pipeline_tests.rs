//! End-to-end runs of the pipeline against the host reference backend.
//!
//! The backend's ledger records every handle acquire and release, which is
//! what the teardown assertions below inspect.

use hello_opencl::backend::reference::{FaultPoint, LedgerEvent, ResourceKind};
use hello_opencl::error::codes;
use hello_opencl::{
    DeviceInfo, DeviceKind, DevicePreference, NullSink, OpenClError, Pipeline, PipelineConfig,
    PipelineEvent, ReferenceBackend, ResourceLocator, RunReport, Stage,
};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bundled_resources() -> ResourceLocator {
    ResourceLocator::new(vec![PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")])
}

fn run(backend: &ReferenceBackend, config: &PipelineConfig) -> Result<RunReport, OpenClError> {
    let locator = bundled_resources();
    Pipeline::new(backend, config, &locator).run(&mut NullSink)
}

fn run_with_source(backend: &ReferenceBackend, source: &str) -> Result<RunReport, OpenClError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.cl");
    std::fs::write(&path, source).unwrap();
    let config = PipelineConfig { kernel_path: Some(path), ..Default::default() };
    run(backend, &config)
}

fn released_ids(events: &[LedgerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            LedgerEvent::Released { id, .. } => Some(*id),
            LedgerEvent::Acquired { .. } => None,
        })
        .collect()
}

/// Every acquired handle was released exactly once, in reverse acquisition
/// order.
fn assert_clean_teardown(backend: &ReferenceBackend) {
    let ledger = backend.ledger();
    assert_eq!(ledger.outstanding(), 0, "leaked handles: {:?}", ledger.events());
    let mut acquired = ledger.acquired_ids();
    for id in &acquired {
        assert_eq!(ledger.release_count(*id), 1, "handle {id} released wrong number of times");
    }
    acquired.reverse();
    assert_eq!(released_ids(&ledger.events()), acquired);
}

// ===========================================================================
// Successful runs
// ===========================================================================

#[test]
fn default_run_squares_every_value_exactly() {
    let backend = ReferenceBackend::new();
    let report = run(&backend, &PipelineConfig::default()).unwrap();

    assert!(report.passed());
    assert_eq!(report.backend, "reference");
    assert_eq!(report.output.len(), 1024);
    for (i, (x, y)) in report.input.iter().zip(&report.output).enumerate() {
        assert_eq!(*x, i as f32);
        assert_eq!(*y, x * x, "element {i}");
    }
    assert!(report.source_path.ends_with("kernel.cl"));
}

#[test]
fn successful_run_releases_in_reverse_order() {
    let backend = ReferenceBackend::new();
    run(&backend, &PipelineConfig::default()).unwrap();

    let ledger = backend.ledger();
    assert_eq!(
        ledger.acquired(),
        vec![
            ResourceKind::Context,
            ResourceKind::Queue,
            ResourceKind::Program,
            ResourceKind::Kernel,
            ResourceKind::Buffer,
            ResourceKind::Buffer,
        ]
    );
    assert_eq!(
        ledger.released(),
        vec![
            ResourceKind::Buffer,
            ResourceKind::Buffer,
            ResourceKind::Kernel,
            ResourceKind::Program,
            ResourceKind::Queue,
            ResourceKind::Context,
        ]
    );
    // The input buffer (acquired first of the two) goes before the output.
    let released = released_ids(&ledger.events());
    assert!(released[0] < released[1]);
    assert_clean_teardown(&backend);
}

#[test]
fn gpu_is_chosen_when_present() {
    let backend = ReferenceBackend::new().with_devices(vec![
        DeviceInfo { name: "Host CPU".into(), vendor: "test".into(), kind: DeviceKind::Cpu },
        DeviceInfo { name: "Test GPU".into(), vendor: "test".into(), kind: DeviceKind::Gpu },
    ]);
    let locator = bundled_resources();
    let config = PipelineConfig::default();
    let mut events: Vec<PipelineEvent> = Vec::new();
    let report = Pipeline::new(&backend, &config, &locator).run(&mut events).unwrap();

    assert_eq!(report.device.name, "Test GPU");
    assert!(!events.contains(&PipelineEvent::GpuUnavailable));
}

#[test]
fn custom_element_count_is_honoured() {
    let backend = ReferenceBackend::new();
    let config = PipelineConfig { num_values: 3, ..Default::default() };
    let report = run(&backend, &config).unwrap();
    assert_eq!(report.output, vec![0.0, 1.0, 4.0]);
}

// ===========================================================================
// Device selection failures
// ===========================================================================

#[test]
fn no_device_aborts_before_context_creation() {
    let backend = ReferenceBackend::new().with_devices(Vec::new());
    let err = run(&backend, &PipelineConfig::default()).unwrap_err();

    assert!(matches!(err, OpenClError::NoDevice));
    assert_eq!(err.to_string(), "No OpenCL devices found");
    assert_eq!(err.stage(), Stage::Device);
    assert!(backend.ledger().events().is_empty());
}

#[test]
fn no_platform_reports_its_code() {
    let backend = ReferenceBackend::new().without_platform();
    let err = run(&backend, &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.code(), Some(codes::PLATFORM_NOT_FOUND_KHR));
    assert!(backend.ledger().events().is_empty());
}

// ===========================================================================
// Source and build failures
// ===========================================================================

#[test]
fn missing_source_aborts_before_compilation() {
    let backend = ReferenceBackend::new();
    let empty = tempfile::tempdir().unwrap();
    let locator = ResourceLocator::new(vec![empty.path().to_path_buf()]);
    let config = PipelineConfig::default();
    let err = Pipeline::new(&backend, &config, &locator).run(&mut NullSink).unwrap_err();

    assert_eq!(err.to_string(), "Could not find kernel.cl in bundle");
    let ledger = backend.ledger();
    assert_eq!(ledger.acquired(), vec![ResourceKind::Context, ResourceKind::Queue]);
    assert_eq!(ledger.released(), vec![ResourceKind::Queue, ResourceKind::Context]);
}

#[test]
fn build_failure_carries_the_full_log() {
    let backend = ReferenceBackend::new();
    let source = "__kernel void square(__global const float* input, __global float* output)\n{\n";
    let err = run_with_source(&backend, source).unwrap_err();

    assert_eq!(err.code(), Some(codes::BUILD_PROGRAM_FAILURE));
    let log = err.build_log().unwrap();
    assert!(log.contains("<program source>:2:1: error:"), "log was: {log}");
    assert!(log.ends_with("1 error generated."));
    assert_eq!(
        backend.ledger().released(),
        vec![ResourceKind::Program, ResourceKind::Queue, ResourceKind::Context]
    );
    assert_clean_teardown(&backend);
}

#[test]
fn invalid_build_options_are_rejected() {
    let backend = ReferenceBackend::new();
    let config = PipelineConfig { build_options: "-D".into(), ..Default::default() };
    let err = run(&backend, &config).unwrap_err();
    assert_eq!(err.code(), Some(codes::INVALID_BUILD_OPTIONS));
    assert_clean_teardown(&backend);
}

#[test]
fn unknown_entry_point_is_invalid_kernel_name() {
    let backend = ReferenceBackend::new();
    let config = PipelineConfig { entry_point: "cube".into(), ..Default::default() };
    match run(&backend, &config) {
        Err(OpenClError::KernelCreation { name, code }) => {
            assert_eq!(name, "cube");
            assert_eq!(code, codes::INVALID_KERNEL_NAME);
        }
        other => panic!("expected KernelCreation, got {other:?}"),
    }
    assert_clean_teardown(&backend);
}

#[test]
fn source_without_kernels_fails_at_kernel_creation() {
    let backend = ReferenceBackend::new();
    let err = run_with_source(&backend, "float helper(float x) { return x; }\n").unwrap_err();
    assert_eq!(err.stage(), Stage::Kernel);
    assert_eq!(err.code(), Some(codes::INVALID_KERNEL_NAME));
}

#[test]
fn explicit_kernel_path_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.cl");
    std::fs::write(&path, include_str!("../resources/kernel.cl")).unwrap();

    let backend = ReferenceBackend::new();
    let config = PipelineConfig { kernel_path: Some(path.clone()), ..Default::default() };
    let locator = ResourceLocator::new(Vec::new());
    let mut events: Vec<PipelineEvent> = Vec::new();
    let report = Pipeline::new(&backend, &config, &locator).run(&mut events).unwrap();

    assert_eq!(report.source_path, path);
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::SourceLoaded { path: p, .. } if *p == path)));
}

// ===========================================================================
// Injected faults
// ===========================================================================

#[test]
fn every_step_failure_tears_down_what_was_acquired() {
    let cases = [
        (FaultPoint::Context, Stage::Context, 0),
        (FaultPoint::Queue, Stage::Queue, 1),
        (FaultPoint::Program, Stage::Program, 2),
        (FaultPoint::InputBuffer, Stage::Buffers, 4),
        (FaultPoint::OutputBuffer, Stage::Buffers, 5),
        (FaultPoint::InputArg, Stage::Arguments, 6),
        (FaultPoint::OutputArg, Stage::Arguments, 6),
        (FaultPoint::Dispatch, Stage::Dispatch, 6),
        (FaultPoint::ReadBack, Stage::ReadBack, 6),
    ];
    for (point, stage, handles) in cases {
        let backend = ReferenceBackend::new().fail_at(point, codes::OUT_OF_RESOURCES);
        let err = run(&backend, &PipelineConfig::default()).unwrap_err();

        assert_eq!(err.stage(), stage, "{point:?}");
        assert_eq!(err.code(), Some(codes::OUT_OF_RESOURCES), "{point:?}");
        assert_eq!(backend.ledger().acquired().len(), handles, "{point:?}");
        assert_clean_teardown(&backend);
    }
}

#[test]
fn buffer_failure_names_the_buffer() {
    let backend =
        ReferenceBackend::new().fail_at(FaultPoint::OutputBuffer, codes::MEM_OBJECT_ALLOCATION_FAILURE);
    let err = run(&backend, &PipelineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("output"), "{err}");
    assert_eq!(backend.ledger().released()[0], ResourceKind::Buffer);
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn corrupted_element_is_reported_not_raised() {
    let backend = ReferenceBackend::new().corrupt_output(7, 0.5);
    let report = run(&backend, &PipelineConfig::default()).unwrap();

    assert!(!report.passed());
    let m = report.validation.mismatch().unwrap();
    assert_eq!(m.index, 7);
    assert_eq!(m.observed, 0.5);
    assert_eq!(m.expected, 49.0);
    assert_clean_teardown(&backend);
}

#[test]
fn wrong_kernel_body_is_caught_by_validation() {
    let backend = ReferenceBackend::new();
    let source = "__kernel void square(__global const float* input, __global float* output)\n\
                  {\n    size_t idx = get_global_id(0);\n    output[idx] = input[idx] + 1.0f;\n}\n";
    let report = run_with_source(&backend, source).unwrap();

    assert!(!report.passed());
    assert_eq!(report.output[3], 4.0);
    let m = report.validation.mismatch().unwrap();
    assert_eq!((m.index, m.observed, m.expected), (0, 1.0, 0.0));
    assert_clean_teardown(&backend);
}

#[test]
fn equivalent_kernel_body_passes() {
    let backend = ReferenceBackend::new();
    let source = "__kernel void square(__global const float* in, __global float* out) {\n\
                  int i = get_global_id(0);\n float v = in[i];\n out[i] = v * v;\n}\n";
    assert!(run_with_source(&backend, source).unwrap().passed());
}

#[test]
fn kernel_body_the_host_cannot_run_is_invalid_definition() {
    let backend = ReferenceBackend::new();
    let source = "__kernel void square(__global const float* input, __global float* output) {\n\
                  size_t idx = get_global_id(0);\n output[idx] = pown(input[idx], 2);\n}\n";
    let err = run_with_source(&backend, source).unwrap_err();
    assert_eq!(err.stage(), Stage::Kernel);
    assert_eq!(err.code(), Some(codes::INVALID_KERNEL_DEFINITION));
    assert_clean_teardown(&backend);
}

#[test]
fn corruption_with_the_right_value_still_passes() {
    let backend = ReferenceBackend::new().corrupt_output(3, 9.0);
    assert!(run(&backend, &PipelineConfig::default()).unwrap().passed());
}

#[test]
fn cpu_only_preference_runs_on_the_reference_device() {
    let backend = ReferenceBackend::new();
    let config = PipelineConfig { device: DevicePreference::Cpu, ..Default::default() };
    let report = run(&backend, &config).unwrap();
    assert_eq!(report.device.kind, DeviceKind::Cpu);
}
