//! Device classification and selection preference.

use crate::error::OpenClError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Gpu,
    Cpu,
    Accelerator,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
            Self::Accelerator => write!(f, "Accelerator"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Which device types to look for, and in which order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Prefer a GPU, fall back to a CPU.
    #[default]
    Auto,
    /// GPU only.
    Gpu,
    /// CPU only.
    Cpu,
}

impl DevicePreference {
    /// Device kinds to request from the platform, first match wins.
    pub fn search_order(self) -> &'static [DeviceKind] {
        match self {
            Self::Auto => &[DeviceKind::Gpu, DeviceKind::Cpu],
            Self::Gpu => &[DeviceKind::Gpu],
            Self::Cpu => &[DeviceKind::Cpu],
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for DevicePreference {
    type Err = OpenClError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(OpenClError::InvalidConfig(format!(
                "unknown device preference '{other}' (expected auto, gpu or cpu)"
            ))),
        }
    }
}

/// Descriptive information about the selected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name (e.g. "Intel(R) Arc(TM) A770 Graphics").
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
}
