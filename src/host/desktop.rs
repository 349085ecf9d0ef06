//! Desktop host backed by `cpal`.
//!
//! Desktop audio stacks have no permission API of their own, so
//! [`DesktopPermission`] reports [`PermissionState::Unsupported`].  On
//! platforms that do gate microphone access (macOS), denial surfaces as a
//! capture failure or as silence.
//!
//! cpal identifies devices by name only, so [`DeviceInfo::id`] and
//! [`DeviceInfo::label`] are the same string.

use std::sync::Arc;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio::CpalStream;
use crate::config::CaptureConfig;

use super::{
    CapabilityProbe, Capabilities, CaptureError, CaptureProvider, CaptureStream, DeviceEnumerator,
    DeviceInfo, DeviceKind, HostError, HostServices, PermissionProbe, PermissionState,
};

// ---------------------------------------------------------------------------
// DesktopHost
// ---------------------------------------------------------------------------

pub struct DesktopHost;

impl DesktopHost {
    /// All four collaborators wired to the default cpal host.
    pub fn services(config: &CaptureConfig) -> HostServices {
        HostServices {
            capabilities: Arc::new(DesktopCapabilities),
            permissions: Arc::new(DesktopPermission),
            devices: Arc::new(DesktopDevices),
            capture: Arc::new(DesktopCapture {
                buffer_secs: config.buffer_secs,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

pub struct DesktopCapabilities;

impl CapabilityProbe for DesktopCapabilities {
    fn capabilities(&self) -> Capabilities {
        let host = cpal::default_host();
        let can_list = match host.input_devices() {
            Ok(_) => true,
            Err(e) => {
                log::warn!("desktop: input devices cannot be listed: {e}");
                false
            }
        };
        Capabilities {
            // Native processes are not sandboxed by origin.
            secure_context: true,
            device_enumeration: can_list,
            stream_acquisition: can_list,
            audio_processing: true,
        }
    }
}

pub struct DesktopPermission;

#[async_trait]
impl PermissionProbe for DesktopPermission {
    async fn query(&self) -> PermissionState {
        PermissionState::Unsupported
    }
}

pub struct DesktopDevices;

#[async_trait]
impl DeviceEnumerator for DesktopDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, HostError> {
        tokio::task::spawn_blocking(list_devices)
            .await
            .map_err(|e| HostError::Enumeration(e.to_string()))?
    }
}

fn list_devices() -> Result<Vec<DeviceInfo>, HostError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let inputs = host
        .input_devices()
        .map_err(|e| HostError::Enumeration(e.to_string()))?;
    for device in inputs {
        let name = device.name().unwrap_or_default();
        devices.push(DeviceInfo {
            id: name.clone(),
            label: name,
            kind: DeviceKind::AudioInput,
        });
    }

    // Outputs are informational; a host that cannot list them is still usable.
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            let name = device.name().unwrap_or_default();
            devices.push(DeviceInfo {
                id: name.clone(),
                label: name,
                kind: DeviceKind::AudioOutput,
            });
        }
    }

    log::debug!("desktop: {} devices enumerated", devices.len());
    Ok(devices)
}

pub struct DesktopCapture {
    buffer_secs: f32,
}

#[async_trait]
impl CaptureProvider for DesktopCapture {
    async fn acquire(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let device_id = device_id.map(str::to_string);
        let buffer_secs = self.buffer_secs;

        let stream = tokio::task::spawn_blocking(move || {
            CpalStream::open(device_id.as_deref(), buffer_secs)
        })
        .await
        .map_err(|e| CaptureError::Backend(e.to_string()))??;

        Ok(Box::new(stream))
    }
}
