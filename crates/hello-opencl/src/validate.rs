//! Host-side check of the kernel output.
//!
//! Comparison is exact (`==`, no tolerance). That is sound here only because
//! squaring a small integer-valued `f32` is exactly representable and IEEE
//! multiplication is correctly rounded on both host and device.

use std::fmt;

/// The value the `square` kernel must produce for `x`.
#[inline]
pub fn expected_square(x: f32) -> f32 {
    x * x
}

/// Input data for a run: `0.0, 1.0, …, (n - 1) as f32`.
pub fn sequential_input(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32).collect()
}

/// First element where the output disagrees with the host reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub index: usize,
    pub observed: f32,
    pub expected: f32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Element {} did not match expected output: saw {:.4}, expected {:.4}",
            self.index, self.observed, self.expected
        )
    }
}

/// Verdict of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validation {
    Passed { checked: usize },
    Mismatch(Mismatch),
}

impl Validation {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Mismatch(m) => Some(m),
            Self::Passed { .. } => None,
        }
    }
}

/// Compare `output[i]` against `input[i] * input[i]` and stop at the first
/// difference.
///
/// A short `output` mismatches at its length with `observed = NaN`.
pub fn validate(input: &[f32], output: &[f32]) -> Validation {
    for (index, &x) in input.iter().enumerate() {
        let expected = expected_square(x);
        let observed = output.get(index).copied().unwrap_or(f32::NAN);
        if observed != expected {
            return Validation::Mismatch(Mismatch { index, observed, expected });
        }
    }
    Validation::Passed { checked: input.len() }
}
