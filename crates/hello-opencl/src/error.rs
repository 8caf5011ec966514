//! Error types for the square-kernel pipeline.
//!
//! Every infrastructure failure carries the pipeline [`Stage`] it happened in
//! and, where the compute API produced one, the raw integer error code.

use crate::backend::BufferRole;
use std::path::PathBuf;
use thiserror::Error;

/// Raw OpenCL status codes used by the backends.
///
/// The reference backend reports the same numbers a real ICD would, so
/// diagnostics look identical regardless of which backend ran.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const DEVICE_NOT_FOUND: i32 = -1;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_DEVICE: i32 = -33;
    pub const INVALID_CONTEXT: i32 = -34;
    pub const INVALID_COMMAND_QUEUE: i32 = -36;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_BUILD_OPTIONS: i32 = -43;
    pub const INVALID_PROGRAM_EXECUTABLE: i32 = -45;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_KERNEL_DEFINITION: i32 = -47;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;
    pub const PLATFORM_NOT_FOUND_KHR: i32 = -1001;
}

/// The protocol step an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Platform,
    Device,
    Context,
    Queue,
    Source,
    Program,
    Build,
    Kernel,
    Buffers,
    Arguments,
    Dispatch,
    ReadBack,
    Validation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Config => "configuration",
            Stage::Platform => "platform selection",
            Stage::Device => "device selection",
            Stage::Context => "context creation",
            Stage::Queue => "command queue creation",
            Stage::Source => "kernel source lookup",
            Stage::Program => "program creation",
            Stage::Build => "program build",
            Stage::Kernel => "kernel creation",
            Stage::Buffers => "buffer creation",
            Stage::Arguments => "kernel argument binding",
            Stage::Dispatch => "kernel dispatch",
            Stage::ReadBack => "result read-back",
            Stage::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// Errors produced while running the square-kernel pipeline.
#[derive(Debug, Error)]
pub enum OpenClError {
    #[error("Error getting platform: {code}")]
    NoPlatform { code: i32 },

    #[error("No OpenCL devices found")]
    NoDevice,

    #[error("Error creating context: {code}")]
    ContextCreation { code: i32 },

    #[error("Error creating command queue: {code}")]
    QueueCreation { code: i32 },

    #[error("Could not find {name} in bundle")]
    ResourceNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Could not read {}: {source}", path.display())]
    ResourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error creating program: {code}")]
    ProgramCreation { code: i32 },

    /// The build log is kept separate from the message so callers can print
    /// it verbatim.
    #[error("Error building program: {code}")]
    ProgramBuild { code: i32, log: String },

    #[error("Error creating kernel '{name}': {code}")]
    KernelCreation { name: String, code: i32 },

    #[error("Error creating {role} buffer ({bytes} bytes): {code}")]
    BufferAllocation { role: BufferRole, bytes: usize, code: i32 },

    #[error("Error setting kernel arguments: {code}")]
    KernelArguments { code: i32 },

    #[error("Error executing kernel: {code}")]
    KernelLaunch { code: i32 },

    #[error("Error reading results: {code}")]
    ReadBack { code: i32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load config {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl OpenClError {
    /// Pipeline step that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::NoPlatform { .. } => Stage::Platform,
            Self::NoDevice => Stage::Device,
            Self::ContextCreation { .. } => Stage::Context,
            Self::QueueCreation { .. } => Stage::Queue,
            Self::ResourceNotFound { .. } | Self::ResourceRead { .. } => Stage::Source,
            Self::ProgramCreation { .. } => Stage::Program,
            Self::ProgramBuild { .. } => Stage::Build,
            Self::KernelCreation { .. } => Stage::Kernel,
            Self::BufferAllocation { .. } => Stage::Buffers,
            Self::KernelArguments { .. } => Stage::Arguments,
            Self::KernelLaunch { .. } => Stage::Dispatch,
            Self::ReadBack { .. } => Stage::ReadBack,
            Self::InvalidConfig(_) | Self::ConfigFile { .. } | Self::BackendUnavailable(_) => {
                Stage::Config
            }
        }
    }

    /// Raw compute-API status code, if the failure came from the API.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::NoPlatform { code }
            | Self::ContextCreation { code }
            | Self::QueueCreation { code }
            | Self::ProgramCreation { code }
            | Self::ProgramBuild { code, .. }
            | Self::KernelCreation { code, .. }
            | Self::BufferAllocation { code, .. }
            | Self::KernelArguments { code }
            | Self::KernelLaunch { code }
            | Self::ReadBack { code } => Some(*code),
            _ => None,
        }
    }

    /// Full compiler output for build failures.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Self::ProgramBuild { log, .. } => Some(log.as_str()),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, OpenClError>;
