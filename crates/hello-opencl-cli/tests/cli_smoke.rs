use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("hello-opencl").unwrap();
    for key in [
        "HELLO_OPENCL_NUM_VALUES",
        "HELLO_OPENCL_KERNEL",
        "HELLO_OPENCL_ENTRY_POINT",
        "HELLO_OPENCL_DEVICE",
        "HELLO_OPENCL_BUILD_OPTIONS",
        "HELLO_OPENCL_STRICT",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn help_works() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--num-values").and(predicate::str::contains("--strict")));
}

#[test]
fn version_works() {
    bin().arg("--version").assert().success();
}

#[test]
fn reference_run_squares_everything() {
    bin()
        .args(["--backend", "reference"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("No GPU found, trying CPU..."))
        .stdout(predicate::str::contains("Using device: Host Reference Device"))
        .stdout(predicate::str::contains("All values were properly squared!"));
}

#[cfg(not(feature = "opencl"))]
#[test]
fn default_run_without_opencl_uses_reference() {
    bin().assert().success().stdout(predicate::str::contains("All values were properly squared!"));
}

#[cfg(not(feature = "opencl"))]
#[test]
fn opencl_backend_without_feature_fails() {
    bin()
        .args(["--backend", "opencl"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("backend unavailable"));
}

#[test]
fn missing_kernel_exits_one() {
    bin()
        .args(["--backend", "reference", "--kernel", "/definitely/missing/kernel.cl"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Could not find"))
        .stdout(predicate::str::contains("properly squared").not());
}

#[test]
fn build_failure_prints_build_log() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "__kernel void square(__global const float* in, __global float* out) {{").unwrap();

    bin()
        .args(["--backend", "reference", "--kernel"])
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error building program: -11"))
        .stdout(predicate::str::contains("Build log:"))
        .stdout(predicate::str::contains("1 error generated."));
}

#[test]
fn gpu_only_without_gpu_reports_no_device() {
    bin()
        .args(["--backend", "reference", "--device", "gpu"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No OpenCL devices found"));
}

#[test]
fn zero_values_is_a_config_error() {
    bin()
        .args(["--backend", "reference", "--num-values", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("num_values"));
}

#[test]
fn unknown_entry_point_exits_one() {
    bin()
        .args(["--backend", "reference", "--entry-point", "cube"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error creating kernel 'cube': -46"));
}

#[test]
fn config_file_and_flags_layer() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "num_values = 16\ndevice = \"gpu\"").unwrap();

    // The file asks for a GPU only; the flag restores CPU fallback.
    bin()
        .args(["--backend", "reference", "--device", "auto", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("All values were properly squared!"));
}

#[test]
fn environment_overrides_apply() {
    bin()
        .args(["--backend", "reference"])
        .env("HELLO_OPENCL_DEVICE", "gpu")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No OpenCL devices found"));
}

#[test]
fn unreadable_config_exits_one() {
    bin()
        .args(["--backend", "reference", "--config", "/definitely/missing.toml"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn logs_go_to_stderr() {
    bin()
        .args(["--backend", "reference", "--log-level", "info"])
        .assert()
        .success()
        .stderr(predicate::str::contains("run finished"))
        .stdout(predicate::str::contains("run finished").not());
}

const OFF_BY_ONE_KERNEL: &str = "__kernel void square(__global const float* input, __global float* output)
{
    size_t idx = get_global_id(0);
    output[idx] = input[idx] + 1.0f;
}
";

fn off_by_one_kernel() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(OFF_BY_ONE_KERNEL.as_bytes()).unwrap();
    file
}

#[test]
fn wrong_result_is_reported_and_exits_zero() {
    let kernel = off_by_one_kernel();
    bin()
        .args(["--backend", "reference", "--kernel"])
        .arg(kernel.path())
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "Error: Element 0 did not match expected output.\nSaw 1.0000, expected 0.0000\n",
        ))
        .stdout(predicate::str::contains("properly squared").not());
}

#[test]
fn wrong_result_exits_two_when_strict() {
    let kernel = off_by_one_kernel();
    bin()
        .args(["--backend", "reference", "--strict", "--kernel"])
        .arg(kernel.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Error: Element 0 did not match expected output."))
        .stdout(predicate::str::contains("Saw 1.0000, expected 0.0000"));
}

#[test]
fn strict_run_with_correct_kernel_exits_zero() {
    bin()
        .args(["--backend", "reference", "--strict"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("All values were properly squared!"));
}
