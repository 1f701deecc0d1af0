// ================================================================================================
// COMPUTE DEVICE SELECTION
// ================================================================================================
//
// The device is decided once per process and stored in the model handle:
// - CUDA for NVIDIA GPUs (built with the `cuda` feature)
// - Metal for Apple Silicon (built with the `metal` feature)
// - CPU fallback for all other cases
//
// `FORCE_GPU_BACKEND` overrides auto-detection.
//
// ================================================================================================

use candle_core::Device;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cuda,
    Metal,
    Cpu,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::Metal => "metal",
            ComputeDevice::Cpu => "cpu",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cuda" | "gpu" => Some(ComputeDevice::Cuda),
            "metal" | "mps" => Some(ComputeDevice::Metal),
            "cpu" => Some(ComputeDevice::Cpu),
            _ => None,
        }
    }

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }

    /// Opens the candle device for this backend.
    pub fn to_candle(&self) -> candle_core::Result<Device> {
        match self {
            ComputeDevice::Cuda => Device::new_cuda(0),
            ComputeDevice::Metal => Device::new_metal(0),
            ComputeDevice::Cpu => Ok(Device::Cpu),
        }
    }
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide device decision plus the raw hardware capability reported by
/// `/health`. `cuda_available` does not depend on which device was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSelection {
    pub device: ComputeDevice,
    pub cuda_available: bool,
}

impl DeviceSelection {
    pub fn new(device: ComputeDevice, cuda_available: bool) -> Self {
        Self {
            device,
            cuda_available,
        }
    }

    pub fn cpu() -> Self {
        Self::new(ComputeDevice::Cpu, false)
    }

    /// Probes the hardware and picks the device.
    pub fn detect(forced: Option<&str>) -> Self {
        let cuda = is_cuda_available();
        let metal = is_metal_available();
        Self::new(select_device(forced, cuda, metal), cuda)
    }
}

/// Picks the backend from an optional override and the probed capabilities.
pub fn select_device(forced: Option<&str>, cuda: bool, metal: bool) -> ComputeDevice {
    if let Some(backend) = forced {
        match ComputeDevice::parse(backend) {
            Some(device) => {
                info!(device = %device, "Forced compute backend via FORCE_GPU_BACKEND");
                return device;
            }
            None => {
                warn!("Invalid FORCE_GPU_BACKEND value: {}, continuing auto-detection", backend);
            }
        }
    }

    if cuda {
        info!("NVIDIA GPU detected - using CUDA backend");
        return ComputeDevice::Cuda;
    }

    if metal {
        info!("Apple Silicon detected - using Metal backend");
        return ComputeDevice::Metal;
    }

    info!("No GPU detected - using CPU backend");
    ComputeDevice::Cpu
}

#[cfg(feature = "cuda")]
fn is_cuda_available() -> bool {
    candle_core::utils::cuda_is_available() && Device::new_cuda(0).is_ok()
}

#[cfg(not(feature = "cuda"))]
fn is_cuda_available() -> bool {
    false
}

#[cfg(feature = "metal")]
fn is_metal_available() -> bool {
    candle_core::utils::metal_is_available() && Device::new_metal(0).is_ok()
}

#[cfg(not(feature = "metal"))]
fn is_metal_available() -> bool {
    false
}
