//! State shared between the units of one run.
//!
//! Every field has exactly one writer:
//!
//! | Field | Written by |
//! |-------|------------|
//! | `capabilities` | `environment-support` |
//! | `permission` | `permission-status`; set to `Granted` by the orchestrator after a stream opens |
//! | `devices` | `device-enumeration` |
//! | `selected_device` | the caller, via the orchestrator |
//! | `stream`, `stream_info` | `audio-stream`; the stream is released by the orchestrator |
//! | `noise_floor` | `noise-floor` |
//! | `speech`, `channel_balance` | `signal-analysis` |

use serde::Serialize;

use crate::audio::{ChannelBalance, Rating};
use crate::host::{Capabilities, CaptureStream, DeviceInfo, DeviceKind, PermissionState, StreamInfo};

/// Background level measured with nobody speaking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseMeasurement {
    /// `None` when the background is below the absolute gate.
    pub loudness_lufs: Option<f64>,
    pub rating: Rating,
}

/// Speech measured during the signal pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechMeasurement {
    /// `None` when no speech was detected.
    pub loudness_lufs: Option<f64>,
    pub loudness_rating: Option<Rating>,
    pub peak_dbfs: f64,
    pub clipping: bool,
    /// Speech loudness minus noise floor; `None` unless both are known.
    pub snr_db: Option<f64>,
    pub snr_rating: Option<Rating>,
}

#[derive(Default)]
pub struct DiagnosticContext {
    pub capabilities: Option<Capabilities>,
    pub permission: Option<PermissionState>,
    /// `None` until enumerated.
    pub devices: Option<Vec<DeviceInfo>>,
    /// Device to test; `None` means the host default.
    pub selected_device: Option<String>,
    pub stream: Option<Box<dyn CaptureStream>>,
    pub stream_info: Option<StreamInfo>,
    pub noise_floor: Option<NoiseMeasurement>,
    pub speech: Option<SpeechMeasurement>,
    pub channel_balance: Option<ChannelBalance>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_device(device_id: Option<String>) -> Self {
        let mut context = Self::default();
        context.selected_device = device_id;
        context
    }

    /// Enumerated audio inputs, empty before enumeration.
    pub fn input_devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices
            .iter()
            .flatten()
            .filter(|d| d.kind == DeviceKind::AudioInput)
    }

    /// Stop the capture stream, if one is open.
    pub fn release_resources(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            log::debug!("context: capture stream released");
        }
    }

    /// Forget everything measured on the selected device.
    pub fn clear_device_state(&mut self) {
        self.release_resources();
        self.stream_info = None;
        self.noise_floor = None;
        self.speech = None;
        self.channel_balance = None;
    }
}

impl Drop for DiagnosticContext {
    fn drop(&mut self) {
        self.release_resources();
    }
}
