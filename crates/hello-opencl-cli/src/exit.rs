// Process exit codes
use hello_opencl::Validation;

pub const EXIT_SUCCESS: i32 = 0;
/// Configuration error or a failed compute API call.
pub const EXIT_INFRA_FAIL: i32 = 1;
/// Output mismatch under `--strict`.
pub const EXIT_VALIDATION_FAIL: i32 = 2;

/// Exit code for a run that reached validation.
///
/// A mismatch is reported but still exits 0 unless `strict` is set.
pub fn exit_code_for(validation: &Validation, strict: bool) -> i32 {
    match validation {
        Validation::Passed { .. } => EXIT_SUCCESS,
        Validation::Mismatch(_) if strict => EXIT_VALIDATION_FAIL,
        Validation::Mismatch(_) => EXIT_SUCCESS,
    }
}
