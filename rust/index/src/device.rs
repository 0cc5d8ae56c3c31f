//! Accelerator device selection.
//!
//! The policy runs once when an encoder is built. It asks a [`DeviceProbe`] for
//! the current device metrics and binds the encoder to one randomly chosen
//! device whose memory utilization and load are both below the configured
//! thresholds. When nothing qualifies the encoder stays on the default
//! execution context. Selection reserves nothing, so concurrently built
//! encoders may end up sharing a device.

use std::fmt::{Debug, Display};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DevicePolicyConfig;

/// Instantaneous metrics of one accelerator. Utilizations are fractions in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub memory_utilization: f32,
    pub load: f32,
}

#[derive(Debug, Error)]
#[error("Failed to query accelerator devices: {0}")]
pub struct DeviceProbeError(pub String);

/// Source of accelerator metrics, queried by the device policy.
pub trait DeviceProbe: Send + Sync + Debug {
    fn available_devices(&self) -> Result<Vec<DeviceInfo>, DeviceProbeError>;
}

/// Probe for hosts without accelerators.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAcceleratorProbe;

impl DeviceProbe for NoAcceleratorProbe {
    fn available_devices(&self) -> Result<Vec<DeviceInfo>, DeviceProbeError> {
        Ok(Vec::new())
    }
}

/// Probe reporting a fixed snapshot of devices, e.g. one gathered by the caller.
#[derive(Clone, Debug, Default)]
pub struct StaticDeviceProbe {
    devices: Vec<DeviceInfo>,
}

impl StaticDeviceProbe {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

impl DeviceProbe for StaticDeviceProbe {
    fn available_devices(&self) -> Result<Vec<DeviceInfo>, DeviceProbeError> {
        Ok(self.devices.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceBinding {
    /// Whatever execution context is available by default.
    Default,
    Device(u32),
}

impl Display for DeviceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceBinding::Default => f.write_str("default"),
            DeviceBinding::Device(id) => write!(f, "device-{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePolicy {
    binding: DeviceBinding,
}

impl Default for DevicePolicy {
    fn default() -> Self {
        Self::unbound()
    }
}

impl DevicePolicy {
    pub fn unbound() -> Self {
        Self {
            binding: DeviceBinding::Default,
        }
    }

    pub fn bound(device_id: u32) -> Self {
        Self {
            binding: DeviceBinding::Device(device_id),
        }
    }

    pub fn binding(&self) -> DeviceBinding {
        self.binding
    }

    pub fn qualifies(device: &DeviceInfo, config: &DevicePolicyConfig) -> bool {
        device.memory_utilization < config.max_memory && device.load < config.max_load
    }

    /// Picks at most one qualifying device. Probe failures and an empty
    /// selection both leave the policy unbound.
    #[tracing::instrument(skip_all)]
    pub fn select(probe: &dyn DeviceProbe, config: &DevicePolicyConfig) -> Self {
        let devices = match probe.available_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Device probe failed, using default context: {}", e);
                return Self::unbound();
            }
        };
        let candidates = devices
            .iter()
            .filter(|device| Self::qualifies(device, config))
            .collect::<Vec<_>>();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match candidates.choose(&mut rng) {
            Some(device) => {
                tracing::info!(
                    "Binding accelerator path to device {} (memory {:.2}, load {:.2})",
                    device.id,
                    device.memory_utilization,
                    device.load
                );
                Self::bound(device.id)
            }
            None => {
                tracing::info!(
                    "No device out of {} below memory {} and load {}, using default context",
                    devices.len(),
                    config.max_memory,
                    config.max_load
                );
                Self::unbound()
            }
        }
    }
}
