//! Compute API abstraction.
//!
//! A [`ComputeBackend`] exposes the handful of platform calls the pipeline
//! makes, one method per call. Every associated handle type releases its
//! underlying resource when dropped, so the pipeline never releases anything
//! by hand.

use crate::device::{DeviceInfo, DeviceKind};
use crate::error::Result;
use std::fmt;

#[cfg(feature = "opencl")]
pub mod opencl;
pub mod reference;

#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;
pub use reference::ReferenceBackend;

/// Which kernel argument a device buffer feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Read-only, initialised from host memory.
    Input,
    /// Write-only, no initial content.
    Output,
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// The compute API surface used by [`crate::pipeline::Pipeline`].
pub trait ComputeBackend {
    type Platform;
    type Device;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Buffer;

    /// Short name for logs ("opencl", "reference").
    fn name(&self) -> &'static str;

    /// Request exactly one platform.
    fn first_platform(&self) -> Result<Self::Platform>;

    /// First device of `kind` on `platform`, if any.
    fn find_device(&self, platform: &Self::Platform, kind: DeviceKind) -> Option<Self::Device>;

    fn device_info(&self, device: &Self::Device) -> DeviceInfo;

    fn create_context(&self, device: &Self::Device) -> Result<Self::Context>;

    /// In-order queue bound to `context` and `device`.
    fn create_queue(&self, context: &Self::Context, device: &Self::Device) -> Result<Self::Queue>;

    fn create_program(&self, context: &Self::Context, source: &str) -> Result<Self::Program>;

    /// Build for `device`. A failed build returns the complete build log.
    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &Self::Device,
        options: &str,
    ) -> Result<()>;

    fn create_kernel(&self, program: &Self::Program, entry_point: &str) -> Result<Self::Kernel>;

    /// Read-only device buffer holding a copy of `data`.
    fn create_input_buffer(&self, context: &Self::Context, data: &[f32]) -> Result<Self::Buffer>;

    /// Write-only device buffer of `len` elements.
    fn create_output_buffer(&self, context: &Self::Context, len: usize) -> Result<Self::Buffer>;

    /// Bind `input` as argument 0 and `output` as argument 1. Both bindings
    /// are attempted; the call fails if either one does.
    fn set_kernel_args(
        &self,
        kernel: &mut Self::Kernel,
        input: &Self::Buffer,
        output: &Self::Buffer,
    ) -> Result<()>;

    /// Submit a 1-D range of `global_size` work-items without waiting.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global_size: usize,
    ) -> Result<()>;

    /// Blocking copy of `buffer` into `dst`. Returns only after every
    /// previously enqueued command and the transfer have completed.
    fn read_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, dst: &mut [f32])
        -> Result<()>;
}
