//! In-process capture endpoint.
//!
//! A [`MemoryFeeder`] plays the role of the audio driver: every pushed batch
//! becomes one samples-ready notification on the open session. Useful for
//! headless hosts that already have audio in memory and for driving the
//! capture loop in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::signals::SignalPair;
use crate::models::audio_models::{DeviceDescriptor, StreamFormat};
use crate::models::error::VoiceChangerError;
use crate::processing::sizing;
use crate::traits::device::{
    CapturePacket, DeviceBackend, DeviceRequest, DeviceSession, ShutdownHandle, Wake,
};

#[derive(Debug, Clone, PartialEq)]
enum MemoryPacket {
    Samples(Vec<f32>),
    Silence(usize),
    Fault(String),
}

impl MemoryPacket {
    fn frames(&self) -> usize {
        match self {
            Self::Samples(s) => s.len(),
            Self::Silence(n) => *n,
            Self::Fault(_) => 0,
        }
    }
}

/// Counters exposed for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryBackendStats {
    pub opens: u64,
    pub waits: u64,
    pub open_sessions: usize,
    pub running_sessions: usize,
}

struct Shared {
    devices: Vec<DeviceDescriptor>,
    device_period: Duration,
    supported_rates: Option<Vec<u32>>,
    queue: Mutex<VecDeque<MemoryPacket>>,
    signals: Mutex<Option<Arc<SignalPair>>>,
    open_failure: Mutex<Option<VoiceChangerError>>,
    opens: AtomicU64,
    waits: AtomicU64,
    open_sessions: AtomicUsize,
    running_sessions: AtomicUsize,
}

impl Shared {
    fn push(&self, packet: MemoryPacket) {
        self.queue.lock().push_back(packet);
        if let Some(signals) = self.signals.lock().as_ref() {
            signals.notify_ready();
        }
    }
}

/// Backend exposing one or more in-memory capture endpoints.
///
/// Cloning shares the same endpoints, queue and counters.
#[derive(Clone)]
pub struct MemoryCaptureBackend {
    shared: Arc<Shared>,
}

impl MemoryCaptureBackend {
    /// A backend with a single endpoint and a 10 ms device period.
    pub fn new() -> Self {
        Self::with_devices(vec![DeviceDescriptor {
            index: 0,
            name: "Memory Capture".into(),
            id: "memory-0".into(),
            is_default: true,
        }])
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            shared: Arc::new(Shared {
                devices,
                device_period: Duration::from_millis(10),
                supported_rates: None,
                queue: Mutex::new(VecDeque::new()),
                signals: Mutex::new(None),
                open_failure: Mutex::new(None),
                opens: AtomicU64::new(0),
                waits: AtomicU64::new(0),
                open_sessions: AtomicUsize::new(0),
                running_sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Restrict the sample rates this endpoint can deliver. Opening at any
    /// other rate fails format negotiation.
    ///
    /// Must be called before the backend is shared.
    pub fn with_supported_rates(mut self, rates: Vec<u32>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.supported_rates = Some(rates);
        }
        self
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: VoiceChangerError) {
        *self.shared.open_failure.lock() = Some(error);
    }

    pub fn feeder(&self) -> MemoryFeeder {
        MemoryFeeder {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> MemoryBackendStats {
        MemoryBackendStats {
            opens: self.shared.opens.load(Ordering::Relaxed),
            waits: self.shared.waits.load(Ordering::Relaxed),
            open_sessions: self.shared.open_sessions.load(Ordering::Relaxed),
            running_sessions: self.shared.running_sessions.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for MemoryCaptureBackend {
    fn list_capture_devices(&self) -> Result<Vec<DeviceDescriptor>, VoiceChangerError> {
        Ok(self.shared.devices.clone())
    }

    fn open(&self, request: &DeviceRequest) -> Result<Box<dyn DeviceSession>, VoiceChangerError> {
        self.shared.opens.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = self.shared.open_failure.lock().take() {
            return Err(error);
        }

        let known = usize::try_from(request.device_index)
            .map(|i| i < self.shared.devices.len())
            .unwrap_or(false);
        if !known {
            return Err(VoiceChangerError::DeviceUnavailable(format!(
                "no capture device at index {}",
                request.device_index
            )));
        }

        if let Some(rates) = &self.shared.supported_rates {
            if !rates.contains(&request.sample_rate) {
                return Err(VoiceChangerError::FormatNegotiationFailed(format!(
                    "mono f32 at {} Hz not supported",
                    request.sample_rate
                )));
            }
        }

        let signals = Arc::new(SignalPair::new());
        *self.shared.signals.lock() = Some(Arc::clone(&signals));
        self.shared.open_sessions.fetch_add(1, Ordering::Relaxed);

        let device_period = self.shared.device_period;
        Ok(Box::new(MemoryCaptureSession {
            shared: Arc::clone(&self.shared),
            signals,
            format: StreamFormat {
                sample_rate: request.sample_rate,
                device_period,
                buffer_period: sizing::buffer_period(
                    device_period,
                    request.latency_tier.multiplier(),
                ),
            },
            current: None,
            running: false,
        }))
    }
}

/// Producer side of a [`MemoryCaptureBackend`].
#[derive(Clone)]
pub struct MemoryFeeder {
    shared: Arc<Shared>,
}

impl MemoryFeeder {
    pub fn push_samples(&self, samples: &[f32]) {
        self.shared.push(MemoryPacket::Samples(samples.to_vec()));
    }

    /// A period the device flags as silent.
    pub fn push_silence(&self, frames: usize) {
        self.shared.push(MemoryPacket::Silence(frames));
    }

    /// Make the read of this packet fail with a device error.
    pub fn push_fault(&self, message: &str) {
        self.shared.push(MemoryPacket::Fault(message.to_string()));
    }

    /// Packets not yet read by a session.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

struct MemoryCaptureSession {
    shared: Arc<Shared>,
    signals: Arc<SignalPair>,
    format: StreamFormat,
    current: Option<MemoryPacket>,
    running: bool,
}

impl DeviceSession for MemoryCaptureSession {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn start(&mut self) -> Result<(), VoiceChangerError> {
        if self.running {
            return Ok(());
        }
        self.running = true;
        self.shared.running_sessions.fetch_add(1, Ordering::Relaxed);

        // batches pushed before start still get one wake-up each
        let queued = self.shared.queue.lock().len();
        for _ in 0..queued {
            self.signals.notify_ready();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), VoiceChangerError> {
        if self.running {
            self.running = false;
            self.shared.running_sessions.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        Arc::clone(&self.signals) as ShutdownHandle
    }

    fn wait(&mut self) -> Result<Wake, VoiceChangerError> {
        self.shared.waits.fetch_add(1, Ordering::Relaxed);
        Ok(self.signals.wait())
    }

    fn read(&mut self) -> Result<CapturePacket<'_>, VoiceChangerError> {
        if self.current.is_some() {
            return Err(VoiceChangerError::DeviceError(
                "previous packet not released".into(),
            ));
        }

        let Some(packet) = self.shared.queue.lock().pop_front() else {
            return Ok(CapturePacket::empty());
        };
        let packet = match packet {
            MemoryPacket::Fault(message) => return Err(VoiceChangerError::DeviceError(message)),
            // nothing pending, so there is nothing to release either
            empty if empty.frames() == 0 => return Ok(CapturePacket::empty()),
            other => other,
        };

        let packet: &MemoryPacket = self.current.insert(packet);
        Ok(match packet {
            MemoryPacket::Samples(samples) => CapturePacket {
                samples: samples.as_slice(),
                frames: samples.len(),
                silent: false,
            },
            MemoryPacket::Silence(frames) => CapturePacket {
                samples: &[],
                frames: *frames,
                silent: true,
            },
            MemoryPacket::Fault(_) => CapturePacket::empty(),
        })
    }

    fn release(&mut self, frames: usize) -> Result<(), VoiceChangerError> {
        let held = self.current.take().map(|p| p.frames()).unwrap_or(0);
        if held != frames {
            return Err(VoiceChangerError::DeviceError(format!(
                "released {} frames, {} were read",
                frames, held
            )));
        }
        Ok(())
    }
}

impl Drop for MemoryCaptureSession {
    fn drop(&mut self) {
        let _ = self.stop();
        let mut signals = self.shared.signals.lock();
        if signals
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.signals))
        {
            *signals = None;
        }
        self.shared.open_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::LatencyTier;

    fn request(index: i32) -> DeviceRequest {
        DeviceRequest {
            device_index: index,
            latency_tier: LatencyTier::Middle,
            sample_rate: 24_000,
        }
    }

    #[test]
    fn negotiates_buffer_period_from_tier() {
        let backend = MemoryCaptureBackend::new();
        let session = backend.open(&request(0)).unwrap();

        let format = session.format();
        assert_eq!(format.sample_rate, 24_000);
        assert_eq!(format.buffer_period, Duration::from_millis(70));
    }

    #[test]
    fn unknown_index_is_unavailable() {
        let backend = MemoryCaptureBackend::new();
        assert!(matches!(
            backend.open(&request(3)),
            Err(VoiceChangerError::DeviceUnavailable(_))
        ));
        assert!(matches!(
            backend.open(&request(-1)),
            Err(VoiceChangerError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn unsupported_rate_fails_negotiation() {
        let backend = MemoryCaptureBackend::new().with_supported_rates(vec![48_000]);
        assert!(matches!(
            backend.open(&request(0)),
            Err(VoiceChangerError::FormatNegotiationFailed(_))
        ));
        assert_eq!(backend.stats().open_sessions, 0);
    }

    #[test]
    fn injected_failure_applies_once() {
        let backend = MemoryCaptureBackend::new();
        backend.fail_next_open(VoiceChangerError::DeviceUnavailable("unplugged".into()));

        assert!(backend.open(&request(0)).is_err());
        assert!(backend.open(&request(0)).is_ok());
    }

    #[test]
    fn read_release_cycle() {
        let backend = MemoryCaptureBackend::new();
        let feeder = backend.feeder();
        let mut session = backend.open(&request(0)).unwrap();
        session.start().unwrap();

        feeder.push_samples(&[0.1, 0.2, 0.3]);
        feeder.push_silence(5);

        assert_eq!(session.wait().unwrap(), Wake::SamplesReady);
        let packet = session.read().unwrap();
        assert_eq!(packet.frames, 3);
        assert_eq!(packet.samples, &[0.1, 0.2, 0.3]);
        assert!(!packet.silent);
        session.release(3).unwrap();

        assert_eq!(session.wait().unwrap(), Wake::SamplesReady);
        let packet = session.read().unwrap();
        assert!(packet.silent);
        assert_eq!(packet.frames, 5);
        session.release(5).unwrap();

        assert_eq!(session.read().unwrap().frames, 0);
    }

    #[test]
    fn empty_packets_need_no_release() {
        let backend = MemoryCaptureBackend::new();
        let feeder = backend.feeder();
        let mut session = backend.open(&request(0)).unwrap();
        session.start().unwrap();

        feeder.push_samples(&[]);
        feeder.push_silence(0);
        feeder.push_samples(&[0.5, 0.25]);

        assert_eq!(session.read().unwrap().frames, 0);
        assert_eq!(session.read().unwrap().frames, 0);
        let packet = session.read().unwrap();
        assert_eq!(packet.samples, &[0.5, 0.25]);
        session.release(2).unwrap();
        assert_eq!(feeder.queued(), 0);
    }

    #[test]
    fn packets_before_start_are_delivered() {
        let backend = MemoryCaptureBackend::new();
        let feeder = backend.feeder();
        feeder.push_samples(&[1.0]);
        assert_eq!(feeder.queued(), 1);

        let mut session = backend.open(&request(0)).unwrap();
        session.start().unwrap();

        assert_eq!(session.wait().unwrap(), Wake::SamplesReady);
        assert_eq!(session.read().unwrap().frames, 1);
    }

    #[test]
    fn fault_packet_fails_read() {
        let backend = MemoryCaptureBackend::new();
        let feeder = backend.feeder();
        let mut session = backend.open(&request(0)).unwrap();
        session.start().unwrap();

        feeder.push_fault("device removed");

        assert_eq!(
            session.read().unwrap_err(),
            VoiceChangerError::DeviceError("device removed".into())
        );
    }

    #[test]
    fn release_mismatch_is_device_error() {
        let backend = MemoryCaptureBackend::new();
        let feeder = backend.feeder();
        let mut session = backend.open(&request(0)).unwrap();
        feeder.push_samples(&[1.0, 2.0]);

        session.read().unwrap();
        assert!(session.release(1).is_err());
    }

    #[test]
    fn shutdown_handle_cancels_wait() {
        let backend = MemoryCaptureBackend::new();
        let mut session = backend.open(&request(0)).unwrap();

        session.shutdown_handle().trigger();

        assert_eq!(session.wait().unwrap(), Wake::Shutdown);
    }

    #[test]
    fn drop_closes_session() {
        let backend = MemoryCaptureBackend::new();
        let mut session = backend.open(&request(0)).unwrap();
        session.start().unwrap();
        assert_eq!(backend.stats().running_sessions, 1);

        drop(session);

        let stats = backend.stats();
        assert_eq!(stats.open_sessions, 0);
        assert_eq!(stats.running_sessions, 0);
    }
}
