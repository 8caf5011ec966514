//! hello-opencl CLI library
//!
//! Exposes the exit-code policy and console reporting for tests.

pub mod exit;
pub mod report;
