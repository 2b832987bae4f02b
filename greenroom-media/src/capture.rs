//
// CPAL-backed microphone source.
//
// The capture callback runs on the audio driver's thread; a dedicated worker
// thread owns the stream and forwards raw chunks to the registered sink only
// while capture is started, so a late chunk can never reach the consumer
// after stop.

use std::sync::{Arc, mpsc};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat as CpalSampleFormat, SizedSample, Stream};

use greenroom_core::types::{CaptureConstraints, RawContainer, SampleFormat};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("failed to list input devices: {0}")]
    ListDevices(#[from] cpal::DevicesError),

    #[error("failed to get default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to play stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio worker failed: {0}")]
    Worker(String),

    #[error("audio worker startup timeout")]
    WorkerTimeout,

    #[error("internal channel error")]
    Channel,
}

/// Coarse classification for the session-level error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    Other,
}

impl CaptureError {
    /// Platform backends report denied access with different error types and
    /// strings; classify from the message the way the rest of the text is
    /// already user-facing.
    pub fn kind(&self) -> CaptureErrorKind {
        match self {
            Self::NoInputDevice => CaptureErrorKind::DeviceUnavailable,
            other => {
                let raw = other.to_string().to_lowercase();
                if raw.contains("permission") || raw.contains("access") || raw.contains("denied") {
                    CaptureErrorKind::PermissionDenied
                } else if raw.contains("device") {
                    CaptureErrorKind::DeviceUnavailable
                } else {
                    CaptureErrorKind::Other
                }
            }
        }
    }
}

/// Sink receiving interleaved f32 little-endian frames at the device rate.
pub type ChunkSink = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

enum Cmd {
    Start,
    Stop,
    Shutdown,
}

enum WorkerMsg {
    Ready,
    Error(String),
}

pub struct MicSource {
    cmd_tx: mpsc::Sender<Cmd>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
    container: RawContainer,
}

impl MicSource {
    pub fn list_input_device_names() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let mut out = Vec::new();
        for dev in host.input_devices()? {
            if let Ok(name) = dev.name() {
                out.push(name);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Open a named device, falling back to the default when the preferred
    /// one is missing.
    pub fn open_named(
        device_name: Option<&str>,
        constraints: &CaptureConstraints,
        sink: ChunkSink,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        if let Some(needle) = device_name {
            let needle = needle.trim();
            if !needle.is_empty() {
                if let Ok(devices) = host.input_devices() {
                    for dev in devices {
                        if let Ok(name) = dev.name() {
                            if name == needle {
                                log::info!("Using input device: {name}");
                                return Self::open(Some(dev), constraints, sink);
                            }
                        }
                    }
                }

                log::warn!("Preferred input device not found, falling back to default: {needle}");
            }
        }

        Self::open(None, constraints, sink)
    }

    pub fn open(
        device: Option<Device>,
        constraints: &CaptureConstraints,
        sink: ChunkSink,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device {
            Some(d) => d,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoInputDevice)?,
        };

        // An audio-only backend cannot satisfy the video half of the request;
        // the preview is the presentation layer's concern.
        log::debug!(
            "capture constraints {}x{} ({:?}) handled as audio-only",
            constraints.width,
            constraints.height,
            constraints.facing
        );

        // Take the device's default input config; normalization to the target
        // rate/layout happens at encode time.
        let default_cfg = device.default_input_config()?;
        let container = RawContainer {
            sample_rate_hz: default_cfg.sample_rate().0,
            channels: default_cfg.channels(),
            sample_format: SampleFormat::F32Le,
        };

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerMsg>();

        let worker_handle = std::thread::spawn(move || {
            let config = default_cfg;
            let sample_format = config.sample_format();

            let stream = match sample_format {
                CpalSampleFormat::F32 => {
                    build_input_stream::<f32>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::I16 => {
                    build_input_stream::<i16>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::U16 => {
                    build_input_stream::<u16>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::I8 => {
                    build_input_stream::<i8>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::U8 => {
                    build_input_stream::<u8>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::I32 => {
                    build_input_stream::<i32>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::U32 => {
                    build_input_stream::<u32>(&device, &config.clone().into(), chunk_tx)
                }
                CpalSampleFormat::F64 => {
                    build_input_stream::<f64>(&device, &config.clone().into(), chunk_tx)
                }
                _ => build_input_stream::<f32>(&device, &config.clone().into(), chunk_tx),
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = worker_tx.send(WorkerMsg::Error(format!("build stream: {e}")));
                    log::error!("Audio stream build failed: {e}");
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = worker_tx.send(WorkerMsg::Error(format!("play stream: {e}")));
                log::error!("Audio stream play failed: {e}");
                return;
            }

            let _ = worker_tx.send(WorkerMsg::Ready);

            run_forwarder(chunk_rx, cmd_rx, sink);
            drop(stream);
        });

        // Block briefly until the worker has either started the stream or failed.
        match worker_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(WorkerMsg::Ready) => {}
            Ok(WorkerMsg::Error(e)) => return Err(CaptureError::Worker(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(CaptureError::WorkerTimeout),
            Err(_) => return Err(CaptureError::Channel),
        }

        Ok(Self {
            cmd_tx,
            worker_handle: Some(worker_handle),
            container,
        })
    }

    /// Format metadata for the chunks this source produces.
    pub fn container(&self) -> RawContainer {
        self.container
    }

    pub fn start(&self) -> Result<(), CaptureError> {
        self.cmd_tx.send(Cmd::Start).map_err(|_| CaptureError::Channel)
    }

    pub fn stop(&self) -> Result<(), CaptureError> {
        self.cmd_tx.send(Cmd::Stop).map_err(|_| CaptureError::Channel)
    }

    /// Stop all tracks and join the worker. Safe to call once; dropping the
    /// source has the same effect.
    pub fn close(&mut self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
        if let Some(h) = self.worker_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    chunk_tx: mpsc::Sender<Vec<u8>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        // Serialize interleaved frames as f32 LE; channel layout is preserved
        // and folded down at encode time.
        let mut bytes = Vec::with_capacity(data.len() * 4);
        for &s in data {
            bytes.extend_from_slice(&s.to_sample::<f32>().to_le_bytes());
        }
        let _ = chunk_tx.send(bytes);
    };

    device.build_input_stream(
        config,
        cb,
        |err| {
            // These errors are crucial to debug "recording started but silent".
            log::error!("Audio stream error: {err}");
        },
        None,
    )
}

fn run_forwarder(chunk_rx: mpsc::Receiver<Vec<u8>>, cmd_rx: mpsc::Receiver<Cmd>, sink: ChunkSink) {
    let mut forwarding = false;

    loop {
        // Always drain commands promptly, even if the stream is stalled.
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Cmd::Start => forwarding = true,
                Cmd::Stop => forwarding = false,
                Cmd::Shutdown => return,
            }
        }

        match chunk_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(chunk) => {
                if forwarding {
                    sink(&chunk);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // No audio chunk yet; loop around to check commands again.
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}
