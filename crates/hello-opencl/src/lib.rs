//! Square an array of `f32` values with an OpenCL kernel and check the
//! result on the host.
//!
//! This crate provides:
//! - [`pipeline`]: the fixed run from device selection to validation
//! - [`backend`]: the compute API trait, the OpenCL backend (feature
//!   `opencl`) and a host reference backend
//! - [`config`]: layered run settings
//! - [`resource`]: kernel source lookup
//! - [`validate`]: exact host-side verification

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod resource;
pub mod validate;

// Re-export primary public types.
#[cfg(feature = "opencl")]
pub use backend::OpenClBackend;
pub use backend::{BufferRole, ComputeBackend, ReferenceBackend};
pub use config::PipelineConfig;
pub use device::{DeviceInfo, DeviceKind, DevicePreference};
pub use error::{OpenClError, Result, Stage};
pub use pipeline::{NullSink, Pipeline, PipelineEvent, ProgressSink, RunReport};
pub use resource::{KernelSource, ResourceLocator};
pub use validate::{Mismatch, Validation};
