//! Audio device enumeration and virtual-output auto-selection.

use serde::{Deserialize, Serialize};

/// Metadata about an audio endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS. Doubles as the
    /// device id for selection.
    pub name: String,
    /// Whether this is the system default for its direction.
    pub is_default: bool,
}

/// Name fragments identifying a virtual loopback output, in priority order.
pub const VIRTUAL_DEVICE_HINTS: [&str; 3] = ["cable input", "vb-audio", "virtual speaker"];

/// Pick the virtual loopback output by case-insensitive substring match,
/// honouring the hint priority order. `None` when no candidate exists.
pub fn find_virtual_output(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    for hint in VIRTUAL_DEVICE_HINTS {
        if let Some(d) = devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(hint))
        {
            return Some(d);
        }
    }
    None
}

/// List all available input (capture) devices.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            vec![]
        }
    }
}

/// List all available output (render) devices.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            vec![]
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}
