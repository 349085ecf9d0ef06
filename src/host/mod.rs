//! Boundary to the host platform.
//!
//! The diagnostics never talk to audio hardware directly.  They go through
//! four collaborator traits, bundled in [`HostServices`]:
//!
//! | Trait | Question answered |
//! |-------|-------------------|
//! | [`CapabilityProbe`] | Can this environment reach microphones at all? |
//! | [`PermissionProbe`] | Has the user granted microphone access? |
//! | [`DeviceEnumerator`] | Which devices exist? |
//! | [`CaptureProvider`] | Open a live stream from one of them. |
//!
//! [`desktop`] implements all four on top of `cpal`.  A scripted in-memory
//! host is available to the test suite as `host::fake`.

pub mod desktop;
#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Host features the microphone check depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// The process runs in a context allowed to open capture devices.
    pub secure_context: bool,
    /// Devices can be listed.
    pub device_enumeration: bool,
    /// Input streams can be opened.
    pub stream_acquisition: bool,
    /// Sample data can be read back for analysis.
    pub audio_processing: bool,
}

impl Capabilities {
    /// Every capability present.
    pub fn all() -> Self {
        Self {
            secure_context: true,
            device_enumeration: true,
            stream_acquisition: true,
            audio_processing: true,
        }
    }

    /// Human-readable names of the missing capabilities, in a fixed order.
    pub fn missing(&self) -> Vec<String> {
        [
            (self.secure_context, "secure context"),
            (self.device_enumeration, "device enumeration"),
            (self.stream_acquisition, "stream acquisition"),
            (self.audio_processing, "audio processing"),
        ]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name.to_string())
        .collect()
    }
}

// ---------------------------------------------------------------------------
// PermissionState
// ---------------------------------------------------------------------------

/// Answer of the permission collaborator.  Some hosts report stale values;
/// a successful stream acquisition overrides whatever was reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    /// The host has no permission API.
    Unsupported,
}

impl PermissionState {
    pub fn label(&self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
            PermissionState::Unsupported => "unsupported",
        }
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    Other,
}

/// One enumerated device.  `label` may be empty until permission is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    pub fn input(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::AudioInput,
        }
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Format of an acquired stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// The host levels the signal before we see it.
    pub auto_gain_control: bool,
}

/// Planar audio captured since the previous read, one `Vec` per channel,
/// samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frames {
    pub channels: Vec<Vec<f32>>,
}

impl Frames {
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the enumeration or permission collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

/// Failures of the capture collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("access to the microphone was denied")]
    PermissionDenied,

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("capture buffer lock poisoned")]
    Poisoned,

    #[error("stream has been released")]
    Released,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

pub trait CapabilityProbe: Send + Sync {
    fn capabilities(&self) -> Capabilities;
}

#[async_trait]
pub trait PermissionProbe: Send + Sync {
    async fn query(&self) -> PermissionState;
}

#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// All devices, in host order.
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, HostError>;
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Open a stream on `device_id`, or on the default input when `None`.
    async fn acquire(&self, device_id: Option<&str>)
        -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A live input stream.
///
/// `release` must stop all hardware access.  It is called explicitly by the
/// owner; implementations should also release on drop.
pub trait CaptureStream: Send {
    fn info(&self) -> StreamInfo;

    /// Audio captured since the previous call.
    fn read(&mut self) -> Result<Frames, CaptureError>;

    fn release(&mut self);
}

// ---------------------------------------------------------------------------
// HostServices
// ---------------------------------------------------------------------------

/// The four collaborators, shared by every diagnostic unit.
#[derive(Clone)]
pub struct HostServices {
    pub capabilities: Arc<dyn CapabilityProbe>,
    pub permissions: Arc<dyn PermissionProbe>,
    pub devices: Arc<dyn DeviceEnumerator>,
    pub capture: Arc<dyn CaptureProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capabilities_are_listed_in_order() {
        let caps = Capabilities {
            secure_context: false,
            device_enumeration: true,
            stream_acquisition: false,
            audio_processing: true,
        };
        assert_eq!(caps.missing(), vec!["secure context", "stream acquisition"]);
        assert!(Capabilities::all().missing().is_empty());
    }

    #[test]
    fn frames_len_is_shortest_channel() {
        let frames = Frames::new(vec![vec![0.0; 10], vec![0.0; 8]]);
        assert_eq!(frames.len(), 8);
        assert_eq!(frames.channel_count(), 2);
        assert!(Frames::default().is_empty());
    }

    #[test]
    fn collaborators_are_object_safe() {
        fn _caps(_: Arc<dyn CapabilityProbe>) {}
        fn _perm(_: Arc<dyn PermissionProbe>) {}
        fn _dev(_: Arc<dyn DeviceEnumerator>) {}
        fn _cap(_: Arc<dyn CaptureProvider>) {}
        fn _stream(_: Box<dyn CaptureStream>) {}
    }
}
