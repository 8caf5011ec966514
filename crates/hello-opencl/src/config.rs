//! Pipeline configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `HELLO_OPENCL_*` environment variables. The CLI applies its flags last.

use crate::device::DevicePreference;
use crate::error::{OpenClError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of values squared by a default run.
pub const DEFAULT_NUM_VALUES: usize = 1024;

/// File name of the kernel source resource.
pub const DEFAULT_KERNEL_FILE: &str = "kernel.cl";

/// Kernel entry point resolved from the compiled program.
pub const DEFAULT_ENTRY_POINT: &str = "square";

/// Upper bound on `num_values` (64 MiB per buffer).
pub const MAX_NUM_VALUES: usize = 1 << 24;

pub const ENV_NUM_VALUES: &str = "HELLO_OPENCL_NUM_VALUES";
pub const ENV_KERNEL: &str = "HELLO_OPENCL_KERNEL";
pub const ENV_ENTRY_POINT: &str = "HELLO_OPENCL_ENTRY_POINT";
pub const ENV_DEVICE: &str = "HELLO_OPENCL_DEVICE";
pub const ENV_BUILD_OPTIONS: &str = "HELLO_OPENCL_BUILD_OPTIONS";
pub const ENV_STRICT: &str = "HELLO_OPENCL_STRICT";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Element count of the input and output buffers.
    pub num_values: usize,
    /// Resource name looked up next to the executable.
    pub kernel_file: String,
    /// Explicit kernel source path; bypasses the resource lookup.
    pub kernel_path: Option<PathBuf>,
    pub entry_point: String,
    pub device: DevicePreference,
    /// Options passed verbatim to the program build.
    pub build_options: String,
    /// Treat a validation mismatch as a failed run.
    pub strict_validation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_values: DEFAULT_NUM_VALUES,
            kernel_file: DEFAULT_KERNEL_FILE.to_string(),
            kernel_path: None,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            device: DevicePreference::default(),
            build_options: String::new(),
            strict_validation: false,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OpenClError::InvalidConfig(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OpenClError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&text).map_err(|e| OpenClError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /// Apply `HELLO_OPENCL_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_NUM_VALUES) {
            self.num_values = v.trim().parse().map_err(|_| {
                OpenClError::InvalidConfig(format!("{ENV_NUM_VALUES}: '{v}' is not a count"))
            })?;
        }
        if let Some(v) = lookup(ENV_KERNEL) {
            self.kernel_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_ENTRY_POINT) {
            self.entry_point = v;
        }
        if let Some(v) = lookup(ENV_DEVICE) {
            self.device = v.parse()?;
        }
        if let Some(v) = lookup(ENV_BUILD_OPTIONS) {
            self.build_options = v;
        }
        if let Some(v) = lookup(ENV_STRICT) {
            self.strict_validation = v == "1" || v.eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    /// Reject settings no backend can run.
    pub fn validate(&self) -> Result<()> {
        if self.num_values == 0 {
            return Err(OpenClError::InvalidConfig("num_values must be > 0".into()));
        }
        if self.num_values > MAX_NUM_VALUES {
            return Err(OpenClError::InvalidConfig(format!(
                "num_values {} exceeds maximum {MAX_NUM_VALUES}",
                self.num_values
            )));
        }
        if self.entry_point.trim().is_empty() {
            return Err(OpenClError::InvalidConfig("entry_point must not be empty".into()));
        }
        if self.kernel_path.is_none() && self.kernel_file.trim().is_empty() {
            return Err(OpenClError::InvalidConfig("kernel_file must not be empty".into()));
        }
        Ok(())
    }

    /// Byte size of one device buffer.
    pub fn buffer_bytes(&self) -> usize {
        self.num_values * std::mem::size_of::<f32>()
    }
}
