//! Inference device selection.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Where a model's forward pass executes.
///
/// Part of the scheduler key: the same model on two devices gets two
/// schedulers, each with its own backend context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Device {
    /// Let the backend pick. The reference backend resolves this to
    /// [`CpuVectorized`](Self::CpuVectorized).
    #[default]
    Default,
    /// General-purpose GPU compute.
    GpuCompute,
    /// Vectorized CPU execution.
    CpuVectorized,
    /// Legacy GPU pixel-shader path.
    GpuPixel,
}

impl Device {
    /// Every device variant, in declaration order.
    pub const ALL: [Device; 4] = [
        Device::Default,
        Device::GpuCompute,
        Device::CpuVectorized,
        Device::GpuPixel,
    ];

    /// Concrete device this choice runs on.
    pub fn resolve(self) -> Device {
        match self {
            Device::Default => Device::CpuVectorized,
            other => other,
        }
    }

    /// Canonical lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Default => "default",
            Device::GpuCompute => "gpu-compute",
            Device::CpuVectorized => "cpu-vectorized",
            Device::GpuPixel => "gpu-pixel",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device name did not match any [`Device`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown device '{0}' (expected default, gpu-compute, cpu-vectorized or gpu-pixel)")]
pub struct ParseDeviceError(pub String);

impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        Device::ALL
            .into_iter()
            .find(|d| d.as_str() == norm)
            .ok_or_else(|| ParseDeviceError(s.to_string()))
    }
}
