//! Scripted in-memory host for tests.
//!
//! Every collaborator counts its invocations so tests can assert that, for
//! example, capture was never attempted after a permission denial.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    CapabilityProbe, Capabilities, CaptureError, CaptureProvider, CaptureStream, DeviceEnumerator,
    DeviceInfo, Frames, HostError, HostServices, PermissionProbe, PermissionState, StreamInfo,
};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

pub struct FakeCapabilities(pub Capabilities);

impl CapabilityProbe for FakeCapabilities {
    fn capabilities(&self) -> Capabilities {
        self.0
    }
}

pub struct FakePermission {
    pub state: PermissionState,
    pub queries: AtomicUsize,
}

#[async_trait]
impl PermissionProbe for FakePermission {
    async fn query(&self) -> PermissionState {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.state
    }
}

pub struct FakeDevices {
    pub devices: Vec<DeviceInfo>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DeviceEnumerator for FakeDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HostError::Enumeration("backend unavailable".into()));
        }
        Ok(self.devices.clone())
    }
}

/// What a [`FakeStream`] produces on each read.
#[derive(Debug, Clone)]
pub struct Script {
    pub info: StreamInfo,
    /// Peak amplitude of the 1 kHz tone on each channel during speech.
    pub speech: Vec<f64>,
    /// Peak amplitude on each channel during the first `quiet_reads` reads.
    /// A pass spends one read draining the stream before its first tick.
    pub quiet: Vec<f64>,
    pub quiet_reads: usize,
    /// Reads (by index) that return an error instead of audio.
    pub failing_reads: Vec<usize>,
    /// Frames returned by one read.
    pub frames_per_read: usize,
}

impl Script {
    /// Stereo 48 kHz: 3 s of near-silence, then a −23 LUFS tone on both sides.
    pub fn stereo_speech() -> Self {
        Self {
            info: StreamInfo {
                sample_rate: 48_000,
                channel_count: 2,
                auto_gain_control: false,
            },
            speech: vec![0.1, 0.1],
            quiet: vec![0.000_5, 0.000_5],
            quiet_reads: 61,
            failing_reads: Vec::new(),
            frames_per_read: 2_400,
        }
    }

    pub fn mono_speech() -> Self {
        Self {
            info: StreamInfo {
                channel_count: 1,
                ..Self::stereo_speech().info
            },
            speech: vec![0.1],
            quiet: vec![0.000_5],
            ..Self::stereo_speech()
        }
    }
}

pub struct FakeCapture {
    pub script: Script,
    pub fail_with: Option<CaptureError>,
    pub acquisitions: AtomicUsize,
    pub releases: Arc<AtomicUsize>,
    pub last_device: std::sync::Mutex<Option<String>>,
}

#[async_trait]
impl CaptureProvider for FakeCapture {
    async fn acquire(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_device.lock() {
            *last = device_id.map(str::to_string);
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(Box::new(FakeStream::new(
            self.script.clone(),
            Arc::clone(&self.releases),
        )))
    }
}

// ---------------------------------------------------------------------------
// FakeStream
// ---------------------------------------------------------------------------

pub struct FakeStream {
    script: Script,
    reads: usize,
    position: usize,
    released: bool,
    releases: Arc<AtomicUsize>,
}

impl FakeStream {
    pub fn new(script: Script, releases: Arc<AtomicUsize>) -> Self {
        Self {
            script,
            reads: 0,
            position: 0,
            released: false,
            releases,
        }
    }
}

impl CaptureStream for FakeStream {
    fn info(&self) -> StreamInfo {
        self.script.info
    }

    fn read(&mut self) -> Result<Frames, CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }
        let index = self.reads;
        self.reads += 1;
        if self.script.failing_reads.contains(&index) {
            return Err(CaptureError::Backend(format!("read {index} failed")));
        }

        let amplitudes = if index < self.script.quiet_reads {
            &self.script.quiet
        } else {
            &self.script.speech
        };
        let rate = self.script.info.sample_rate as f64;
        let start = self.position;
        let n = self.script.frames_per_read;
        self.position += n;

        let channels = amplitudes
            .iter()
            .map(|&a| {
                (start..start + n)
                    .map(|i| (a * (2.0 * PI * 1_000.0 * i as f64 / rate).sin()) as f32)
                    .collect()
            })
            .collect();
        Ok(Frames::new(channels))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// All four collaborators with direct access for assertions.
pub struct FakeHost {
    pub capabilities: Arc<FakeCapabilities>,
    pub permission: Arc<FakePermission>,
    pub devices: Arc<FakeDevices>,
    pub capture: Arc<FakeCapture>,
}

impl FakeHost {
    /// Fully capable host, permission granted, one labelled stereo input.
    pub fn healthy() -> Self {
        Self::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        )
    }

    pub fn with(
        capabilities: Capabilities,
        permission: PermissionState,
        devices: Vec<DeviceInfo>,
        script: Script,
    ) -> Self {
        Self {
            capabilities: Arc::new(FakeCapabilities(capabilities)),
            permission: Arc::new(FakePermission {
                state: permission,
                queries: AtomicUsize::new(0),
            }),
            devices: Arc::new(FakeDevices {
                devices,
                fail: false,
                calls: AtomicUsize::new(0),
            }),
            capture: Arc::new(FakeCapture {
                script,
                fail_with: None,
                acquisitions: AtomicUsize::new(0),
                releases: Arc::new(AtomicUsize::new(0)),
                last_device: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Replace the capture collaborator with one that always fails.
    pub fn failing_capture(mut self, err: CaptureError) -> Self {
        let script = self.capture.script.clone();
        self.capture = Arc::new(FakeCapture {
            script,
            fail_with: Some(err),
            acquisitions: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            last_device: std::sync::Mutex::new(None),
        });
        self
    }

    /// Replace the device collaborator with one whose enumeration fails.
    pub fn failing_enumeration(mut self) -> Self {
        self.devices = Arc::new(FakeDevices {
            devices: self.devices.devices.clone(),
            fail: true,
            calls: AtomicUsize::new(0),
        });
        self
    }

    pub fn services(&self) -> HostServices {
        HostServices {
            capabilities: self.capabilities.clone(),
            permissions: self.permission.clone(),
            devices: self.devices.clone(),
            capture: self.capture.clone(),
        }
    }

    pub fn enumerations(&self) -> usize {
        self.devices.calls.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.capture.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.capture.releases.load(Ordering::SeqCst)
    }

    pub fn permission_queries(&self) -> usize {
        self.permission.queries.load(Ordering::SeqCst)
    }
}
