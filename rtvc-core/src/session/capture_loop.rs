use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::engine::invoker::TransformInvoker;
use crate::engine::transform::TransformEngine;
use crate::models::audio_models::{AudioBlock, CaptureDiagnostics, EngineInfo};
use crate::models::error::VoiceChangerError;
use crate::models::state::CaptureState;
use crate::params::store::ParameterStore;
use crate::processing::block_segmenter::{Batch, BlockSegmenter};
use crate::processing::sizing;
use crate::traits::audio_sink::AudioSink;
use crate::traits::device::{DeviceBackend, DeviceRequest, DeviceSession, ShutdownHandle, Wake};

/// Name of the real-time capture thread.
pub const CAPTURE_THREAD_NAME: &str = "rtvc-capture";

/// Counters written by the capture thread, read by the control context.
#[derive(Debug, Default)]
struct Counters {
    wakes: AtomicU64,
    packets: AtomicU64,
    frames_captured: AtomicU64,
    silent_packets: AtomicU64,
    blocks_emitted: AtomicU64,
    blocks_dropped: AtomicU64,
    engine_faults: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        for counter in [
            &self.wakes,
            &self.packets,
            &self.frames_captured,
            &self.silent_packets,
            &self.blocks_emitted,
            &self.blocks_dropped,
            &self.engine_faults,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Mutable loop state, protected by `parking_lot::Mutex`.
#[derive(Debug, Default)]
struct LoopState {
    state: CaptureState,
    session_id: Option<String>,
    buffer_frames: usize,
}

/// State shared between the control context and the capture thread.
struct Shared {
    state: Mutex<LoopState>,
    counters: Counters,
    sink: Arc<dyn AudioSink>,
}

impl Shared {
    fn set_state(&self, new_state: CaptureState) {
        self.state.lock().state = new_state;
        log::debug!("capture state: {}", new_state.as_str());
        self.sink.on_state_changed(new_state);
    }

    /// Move to `to` only if still in `from`. Returns whether it moved.
    fn advance_state(&self, from: CaptureState, to: CaptureState) -> bool {
        {
            let mut s = self.state.lock();
            if s.state != from {
                return false;
            }
            s.state = to;
        }
        log::debug!("capture state: {}", to.as_str());
        self.sink.on_state_changed(to);
        true
    }
}

struct Worker {
    shutdown: ShutdownHandle,
    handle: thread::JoinHandle<Box<dyn DeviceSession>>,
}

/// Owns one capture device session at a time and the thread that drains it.
///
/// ```text
/// [DeviceSession] → wait/read → [BlockSegmenter] → [TransformInvoker] → [AudioSink]
/// ```
///
/// Routing (device index, latency tier) is read from the parameter store on
/// every `start`. Other parameters are snapshotted per region by the capture
/// thread, so they take effect without a restart.
pub struct CaptureLoop {
    backend: Arc<dyn DeviceBackend>,
    engine: Arc<dyn TransformEngine>,
    params: Arc<ParameterStore>,
    info: EngineInfo,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl CaptureLoop {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        engine: Arc<dyn TransformEngine>,
        sink: Arc<dyn AudioSink>,
        params: Arc<ParameterStore>,
        info: EngineInfo,
    ) -> Self {
        Self {
            backend,
            engine,
            params,
            info,
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState::default()),
                counters: Counters::default(),
                sink,
            }),
            worker: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn engine_info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let (session_id, buffer_frames) = {
            let s = self.shared.state.lock();
            (s.session_id.clone(), s.buffer_frames)
        };
        let c = &self.shared.counters;
        CaptureDiagnostics {
            session_id,
            buffer_frames,
            wakes: c.wakes.load(Ordering::Relaxed),
            packets: c.packets.load(Ordering::Relaxed),
            frames_captured: c.frames_captured.load(Ordering::Relaxed),
            silent_packets: c.silent_packets.load(Ordering::Relaxed),
            blocks_emitted: c.blocks_emitted.load(Ordering::Relaxed),
            blocks_dropped: c.blocks_dropped.load(Ordering::Relaxed),
            engine_faults: c.engine_faults.load(Ordering::Relaxed),
        }
    }

    /// Open the configured device and start the capture thread.
    /// Transitions: idle → starting → running, or starting → idle on failure.
    /// A device fault on the new thread can move starting → stopping before
    /// running is reported; running is then skipped.
    pub fn start(&mut self) -> Result<(), VoiceChangerError> {
        {
            let s = self.shared.state.lock();
            if !s.state.is_idle() || self.worker.is_some() {
                return Err(VoiceChangerError::InvalidState(format!(
                    "can only start from idle state (currently {})",
                    s.state.as_str()
                )));
            }
        }

        let routing = self.params.routing();
        let device_index = routing.device_index.ok_or_else(|| {
            VoiceChangerError::ConfigurationFailed("no capture device configured".into())
        })?;

        self.shared.set_state(CaptureState::Starting);

        let request = DeviceRequest {
            device_index,
            latency_tier: routing.latency_tier,
            sample_rate: self.info.sample_rate,
        };
        match self.spawn_worker(&request) {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                log::error!("failed to start capture on device {}: {}", device_index, e);
                self.shared.set_state(CaptureState::Idle);
                Err(e)
            }
        }
    }

    fn spawn_worker(&self, request: &DeviceRequest) -> Result<Worker, VoiceChangerError> {
        let mut session = self.backend.open(request)?;

        let format = session.format();
        let block_length = self.info.block_size;
        let buffer_frames = sizing::buffer_frames(format.sample_rate, format.buffer_period, block_length);
        let segmenter = BlockSegmenter::new(block_length, buffer_frames)?;

        log::info!(
            "device {}: {} [hz], {} ({} x {:?}), buffer {} frames",
            request.device_index,
            format.sample_rate,
            request.latency_tier,
            request.latency_tier.multiplier(),
            format.device_period,
            buffer_frames
        );

        session.start()?;

        let session_id = uuid::Uuid::new_v4().to_string();
        self.shared.counters.reset();
        {
            let mut s = self.shared.state.lock();
            s.session_id = Some(session_id);
            s.buffer_frames = buffer_frames;
        }

        let shutdown = session.shutdown_handle();
        let ctx = CaptureContext {
            shared: Arc::clone(&self.shared),
            params: Arc::clone(&self.params),
            invoker: TransformInvoker::new(Arc::clone(&self.engine), block_length),
            segmenter,
            sample_rate: format.sample_rate,
            next_block_position: 0,
            faulting: false,
        };

        let spawned = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.into())
            .spawn(move || ctx.run(session));

        match spawned {
            Ok(handle) => {
                self.shared.advance_state(CaptureState::Starting, CaptureState::Running);
                Ok(Worker { shutdown, handle })
            }
            // the closure, and with it the session, is dropped here
            Err(e) => Err(VoiceChangerError::Unknown(format!(
                "failed to spawn capture thread: {}",
                e
            ))),
        }
    }

    /// Stop the capture thread and close the device.
    /// Transitions: running → stopping → idle. A no-op when idle.
    pub fn stop(&mut self) -> Result<(), VoiceChangerError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        if self.state() != CaptureState::Stopping {
            self.shared.set_state(CaptureState::Stopping);
        }

        worker.shutdown.trigger();
        let result = match worker.handle.join() {
            Ok(mut session) => {
                let stopped = session.stop();
                if let Err(e) = &stopped {
                    log::error!("failed to stop capture device: {}", e);
                }
                stopped
            }
            Err(_) => {
                log::error!("capture thread panicked");
                Err(VoiceChangerError::Unknown("capture thread panicked".into()))
            }
        };

        let diagnostics = self.diagnostics();
        log::info!(
            "capture stopped: {} packets, {} frames, {} blocks emitted, {} dropped",
            diagnostics.packets,
            diagnostics.frames_captured,
            diagnostics.blocks_emitted,
            diagnostics.blocks_dropped
        );

        self.shared.set_state(CaptureState::Idle);
        result
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything the capture thread owns.
struct CaptureContext {
    shared: Arc<Shared>,
    params: Arc<ParameterStore>,
    invoker: TransformInvoker,
    segmenter: BlockSegmenter,
    sample_rate: u32,
    /// Stream position of the next block's first frame.
    next_block_position: u64,
    faulting: bool,
}

impl CaptureContext {
    fn run(mut self, mut session: Box<dyn DeviceSession>) -> Box<dyn DeviceSession> {
        if let Err(e) = session.attach_capture_thread() {
            self.fail(e);
            return session;
        }

        loop {
            let wake = match session.wait() {
                Ok(wake) => wake,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            };
            if wake == Wake::Shutdown {
                break;
            }
            Counters::bump(&self.shared.counters.wakes, 1);

            if let Err(e) = self.drain_packet(session.as_mut()) {
                self.fail(e);
                break;
            }
        }

        session.detach_capture_thread();
        session
    }

    /// Read one batch, push it through segmenter and engine, release it.
    fn drain_packet(&mut self, session: &mut dyn DeviceSession) -> Result<(), VoiceChangerError> {
        let packet = session.read()?;
        let frames = packet.frames;
        if frames == 0 {
            return Ok(());
        }

        let counters = &self.shared.counters;
        Counters::bump(&counters.packets, 1);
        Counters::bump(&counters.frames_captured, frames as u64);
        if packet.silent {
            Counters::bump(&counters.silent_packets, 1);
        }

        let batch = Batch::from_packet(packet.samples, frames, packet.silent);
        let Self {
            shared,
            params,
            invoker,
            segmenter,
            sample_rate,
            next_block_position,
            faulting,
        } = self;

        segmenter.feed(batch, |region| {
            let snapshot = params.snapshot();
            let base = *next_block_position;
            let block_length = invoker.block_length() as u64;

            let report = invoker.process(region, &snapshot, |index, samples| {
                shared.sink.output_audio(&AudioBlock {
                    samples,
                    sample_rate: *sample_rate,
                    timestamp_ns: wall_clock_ns(),
                    frame_position: base + index as u64 * block_length,
                });
            });

            *next_block_position += region.len() as u64;
            let counters = &shared.counters;
            Counters::bump(&counters.blocks_emitted, report.emitted as u64);
            Counters::bump(&counters.blocks_dropped, report.dropped as u64);

            match report.first_fault {
                Some(fault) => {
                    Counters::bump(&counters.engine_faults, 1);
                    if !*faulting {
                        log::warn!("{}; dropping blocks until the engine recovers", fault);
                        *faulting = true;
                    }
                }
                None if *faulting => {
                    log::info!("engine recovered");
                    *faulting = false;
                }
                None => {}
            }
        });

        session.release(frames)
    }

    fn fail(&self, error: VoiceChangerError) {
        log::error!("capture thread stopped: {}", error);
        self.shared.set_state(CaptureState::Stopping);
        self.shared.sink.on_error(&error);
    }
}

fn wall_clock_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |ns| ns.max(0) as u64)
}
