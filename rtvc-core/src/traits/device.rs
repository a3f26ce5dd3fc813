use std::sync::Arc;

use crate::models::audio_models::{DeviceDescriptor, StreamFormat};
use crate::models::config::LatencyTier;
use crate::models::error::VoiceChangerError;

/// What the capture loop asks a backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Index into the backend's enumerated active capture endpoints.
    pub device_index: i32,
    pub latency_tier: LatencyTier,
    /// Sample rate the engine runs at; the session must deliver mono f32 at
    /// this rate.
    pub sample_rate: u32,
}

/// Why the capture thread woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    SamplesReady,
    Shutdown,
}

/// One batch of captured frames, borrowed from the device until released.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePacket<'a> {
    pub samples: &'a [f32],
    pub frames: usize,
    /// The device flagged this period as silent; `samples` must be ignored.
    pub silent: bool,
}

impl CapturePacket<'_> {
    pub fn empty() -> Self {
        CapturePacket {
            samples: &[],
            frames: 0,
            silent: false,
        }
    }
}

/// Cancels a session's wait from another thread.
pub trait ShutdownTrigger: Send + Sync {
    fn trigger(&self);
}

pub type ShutdownHandle = Arc<dyn ShutdownTrigger>;

/// Source of capture sessions.
///
/// Implemented by:
/// - `MemoryCaptureBackend` (in-process endpoint, this crate)
/// - `WasapiCaptureBackend` (Windows)
pub trait DeviceBackend: Send + Sync {
    /// Active capture endpoints for the device picker.
    fn list_capture_devices(&self) -> Result<Vec<DeviceDescriptor>, VoiceChangerError>;

    /// Open a capture endpoint and negotiate mono f32 at the requested rate.
    ///
    /// Fails with `DeviceUnavailable` or `FormatNegotiationFailed`.
    fn open(&self, request: &DeviceRequest) -> Result<Box<dyn DeviceSession>, VoiceChangerError>;
}

/// An opened capture endpoint.
///
/// After `start`, the session is driven from the capture thread only, except
/// for the handle returned by `shutdown_handle`. Dropping the session closes
/// the endpoint.
pub trait DeviceSession: Send {
    fn format(&self) -> StreamFormat;

    fn start(&mut self) -> Result<(), VoiceChangerError>;

    fn stop(&mut self) -> Result<(), VoiceChangerError>;

    fn shutdown_handle(&self) -> ShutdownHandle;

    /// Block until samples are ready or shutdown is requested.
    fn wait(&mut self) -> Result<Wake, VoiceChangerError>;

    /// Next available batch. `frames == 0` means nothing was pending.
    fn read(&mut self) -> Result<CapturePacket<'_>, VoiceChangerError>;

    /// Hand the last read batch back to the device.
    fn release(&mut self, frames: usize) -> Result<(), VoiceChangerError>;

    /// Runs first on the capture thread (thread priority, COM apartment).
    /// An error ends the thread before the first wait; the session must
    /// undo any partial setup itself.
    fn attach_capture_thread(&mut self) -> Result<(), VoiceChangerError> {
        Ok(())
    }

    /// Runs last on the capture thread, after a successful attach.
    fn detach_capture_thread(&mut self) {}
}
