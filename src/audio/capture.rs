//! Microphone capture via `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`CpalStream`] never
//! holds one.  It spawns a dedicated thread that opens the device, builds
//! and plays the stream, and then parks until told to stop.  The audio
//! callback appends interleaved samples to a shared [`FrameBuffer`];
//! [`CaptureStream::read`] drains it as planar channels.
//!
//! ```text
//! open() ──spawn──▶ capture thread: pick device → build stream → play
//!    ◀── ready(StreamInfo | CaptureError) ──┘        │
//!                                                    ▼
//! read() ◀── Arc<Mutex<FrameBuffer>> ◀── cpal callback
//! release() ── Stop ──▶ capture thread drops the stream, exits; join
//! ```

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};

use crate::host::{CaptureError, CaptureStream, Frames, StreamInfo};

use super::buffer::FrameBuffer;

// ---------------------------------------------------------------------------
// cpal error conversion
// ---------------------------------------------------------------------------

impl From<cpal::DevicesError> for CaptureError {
    fn from(e: cpal::DevicesError) -> Self {
        CaptureError::Backend(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        CaptureError::Backend(format!("failed to query input config: {e}"))
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        CaptureError::Backend(format!("failed to build input stream: {e}"))
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        CaptureError::Backend(format!("failed to start input stream: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Device selection
// ---------------------------------------------------------------------------

/// Resolve `device_id` (a device name) on `host`, or its default input.
pub(crate) fn find_input_device(
    host: &cpal::Host,
    device_id: Option<&str>,
) -> Result<Device, CaptureError> {
    match device_id {
        None => host.default_input_device().ok_or(CaptureError::NoDevice),
        Some(id) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(id.to_string())),
    }
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

enum Command {
    Stop,
}

/// A live cpal input stream owned by a background thread.
pub struct CpalStream {
    info: StreamInfo,
    buffer: Arc<Mutex<FrameBuffer>>,
    command_tx: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    /// Open `device_id` (or the default input) and start capturing.
    ///
    /// Blocks until the capture thread reports the stream running or
    /// failed; call from a blocking context.
    pub fn open(device_id: Option<&str>, buffer_secs: f32) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let device_id = device_id.map(str::to_string);

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture_thread(device_id, buffer_secs, ready_tx, command_rx))
            .map_err(|e| CaptureError::Backend(format!("failed to spawn capture thread: {e}")))?;

        let (info, buffer) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::Backend(
                    "capture thread exited before the stream started".into(),
                ));
            }
        };

        log::info!(
            "capture: stream running ({} Hz, {} ch)",
            info.sample_rate,
            info.channel_count
        );

        Ok(Self {
            info,
            buffer,
            command_tx,
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.command_tx.send(Command::Stop);
            let _ = handle.join();
            log::info!("capture: stream released");
        }
    }
}

impl CaptureStream for CpalStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read(&mut self) -> Result<Frames, CaptureError> {
        if self.thread.is_none() {
            return Err(CaptureError::Released);
        }
        let mut buffer = self.buffer.lock().map_err(|_| CaptureError::Poisoned)?;
        let lost = buffer.take_overwritten();
        if lost > 0 {
            log::warn!(
                "capture: reader fell behind, {lost} frames dropped ({:.0} ms)",
                lost as f64 * 1000.0 / f64::from(self.info.sample_rate)
            );
        }
        Ok(Frames::new(buffer.drain_planar()))
    }

    fn release(&mut self) {
        self.stop();
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Capture thread
// ---------------------------------------------------------------------------

type Ready = Result<(StreamInfo, Arc<Mutex<FrameBuffer>>), CaptureError>;

fn run_capture_thread(
    device_id: Option<String>,
    buffer_secs: f32,
    ready_tx: mpsc::Sender<Ready>,
    command_rx: mpsc::Receiver<Command>,
) {
    let stream = match start_stream(device_id.as_deref(), buffer_secs) {
        Ok((stream, info, buffer)) => {
            let _ = ready_tx.send(Ok((info, buffer)));
            stream
        }
        Err(e) => {
            log::error!("capture: {e}");
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Park until stopped or the owner is gone.
    match command_rx.recv() {
        Ok(Command::Stop) => log::debug!("capture: stop requested"),
        Err(_) => log::debug!("capture: owner dropped"),
    }
    drop(stream);
}

fn start_stream(
    device_id: Option<&str>,
    buffer_secs: f32,
) -> Result<(cpal::Stream, StreamInfo, Arc<Mutex<FrameBuffer>>), CaptureError> {
    let host = cpal::default_host();
    let device = find_input_device(&host, device_id)?;
    let supported = device.default_input_config()?;

    let format = supported.sample_format();
    let info = StreamInfo {
        sample_rate: supported.sample_rate().0,
        channel_count: supported.channels(),
        // cpal hands us the raw device signal.
        auto_gain_control: false,
    };
    if info.channel_count == 0 {
        return Err(CaptureError::Backend("device reports zero channels".into()));
    }
    let config: StreamConfig = supported.into();
    let buffer = Arc::new(Mutex::new(FrameBuffer::with_duration(
        info.channel_count,
        info.sample_rate,
        buffer_secs,
    )));

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&buffer)),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&buffer)),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&buffer)),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, Arc::clone(&buffer)),
        other => {
            return Err(CaptureError::Backend(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }?;
    stream.play()?;

    Ok((stream, info, buffer))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<FrameBuffer>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::Sample + cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data
                .iter()
                .map(|s| cpal::Sample::from_sample(*s))
                .collect();
            if let Ok(mut buf) = buffer.lock() {
                buf.push_interleaved(&samples);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
