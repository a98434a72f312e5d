//! Compute device selection.

use std::fmt;
use std::str::FromStr;

/// Device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn name(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Pick CUDA when it is both allowed and available, otherwise CPU.
    pub fn select(preference: DevicePreference, cuda_available: bool) -> Self {
        match preference {
            DevicePreference::Auto | DevicePreference::Cuda if cuda_available => Device::Cuda,
            DevicePreference::Cuda => {
                log::warn!("CUDA requested but not available, falling back to CPU");
                Device::Cpu
            }
            _ => Device::Cpu,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested device, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "cpu" => Ok(DevicePreference::Cpu),
            other => Err(format!("unknown device '{other}', expected auto, cuda or cpu")),
        }
    }
}

/// Whether the ONNX Runtime CUDA execution provider can be used.
#[cfg(feature = "neutts")]
pub fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            log::debug!("CUDA availability probe failed: {e}");
            false
        }
    }
}

/// Whether the ONNX Runtime CUDA execution provider can be used.
#[cfg(not(feature = "neutts"))]
pub fn cuda_available() -> bool {
    false
}
