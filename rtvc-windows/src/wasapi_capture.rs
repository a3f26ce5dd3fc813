//! WASAPI capture backend.
//!
//! Opens a capture endpoint in shared, event-driven mode with a mono 32-bit
//! float format at the engine's rate and lets the audio engine convert from
//! the device mix format. The capture thread blocks in
//! `WaitForMultipleObjects` on the samples-ready and shutdown events.

use std::sync::Arc;

use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::KernelStreaming::{KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, SPEAKER_FRONT_CENTER, WAVE_FORMAT_EXTENSIBLE};
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use rtvc_core::models::audio_models::{DeviceDescriptor, StreamFormat};
use rtvc_core::models::error::VoiceChangerError;
use rtvc_core::processing::sizing;
use rtvc_core::traits::device::{
    CapturePacket, DeviceBackend, DeviceRequest, DeviceSession, ShutdownHandle, ShutdownTrigger, Wake,
};

use crate::device_enumerator::{friendly_name, DeviceEnumerator};

type VcResult<T> = std::result::Result<T, VoiceChangerError>;

/// RAII COM apartment membership for the current thread.
///
/// Uninitializes on drop only when this guard's call joined the apartment;
/// a thread already in an STA (`RPC_E_CHANGED_MODE`) is left alone.
pub(crate) struct ComApartment {
    owned: bool,
}

impl ComApartment {
    pub(crate) fn enter() -> VcResult<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|e| VoiceChangerError::InitializationFault(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

/// RAII MMCSS task registration, "Pro Audio" with an "Audio" fallback.
struct MmcssRegistration(HANDLE);

impl MmcssRegistration {
    fn register() -> VcResult<Self> {
        let mut task_index = 0u32;
        let handle = unsafe { AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) }
            .or_else(|_| unsafe { AvSetMmThreadCharacteristicsW(w!("Audio"), &mut task_index) })
            .map_err(|e| VoiceChangerError::DeviceError(format!("AvSetMmThreadCharacteristics: {}", e)))?;
        Ok(Self(handle))
    }
}

impl Drop for MmcssRegistration {
    fn drop(&mut self) {
        let _ = unsafe { AvRevertMmThreadCharacteristics(self.0) };
    }
}

/// Auto-reset Win32 event, closed on drop.
struct EventHandle(HANDLE);

impl EventHandle {
    fn new(purpose: &str) -> VcResult<Self> {
        unsafe {
            CreateEventExW(
                None,
                PCWSTR::null(),
                CREATE_EVENT(0),
                (EVENT_MODIFY_STATE | SYNCHRONIZATION_SYNCHRONIZE).0,
            )
        }
        .map(Self)
        .map_err(|e| VoiceChangerError::DeviceError(format!("unable to create {} event: {}", purpose, e)))
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

// SAFETY: an event handle may be signalled and closed from any thread.
unsafe impl Send for EventHandle {}
unsafe impl Sync for EventHandle {}

impl ShutdownTrigger for EventHandle {
    fn trigger(&self) {
        if let Err(e) = unsafe { SetEvent(self.0) } {
            log::error!("unable to signal shutdown: {}", e);
        }
    }
}

/// Capture backend over the active WASAPI capture endpoints.
///
/// Device indices refer to the order of the active endpoint collection, as
/// returned by `list_capture_devices`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiCaptureBackend;

impl WasapiCaptureBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for WasapiCaptureBackend {
    fn list_capture_devices(&self) -> VcResult<Vec<DeviceDescriptor>> {
        let _com = ComApartment::enter()?;
        DeviceEnumerator::new()?.list_capture_devices()
    }

    fn open(&self, request: &DeviceRequest) -> VcResult<Box<dyn DeviceSession>> {
        let com = ComApartment::enter()?;
        let session = WasapiCaptureSession::open(request, com)?;
        Ok(Box::new(session))
    }
}

/// Per-thread state created by `attach_capture_thread`.
struct CaptureThreadState {
    // field order is drop order: revert MMCSS before leaving COM
    _mmcss: MmcssRegistration,
    _com: ComApartment,
}

/// An initialized, event-driven capture client.
///
/// Must be dropped on the thread that opened it.
pub struct WasapiCaptureSession {
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    samples_ready: EventHandle,
    shutdown: Arc<EventHandle>,
    format: StreamFormat,
    thread_state: Option<CaptureThreadState>,
    held_frames: u32,
    started: bool,
    _com: ComApartment,
}

// SAFETY: the COM objects live in the multithreaded apartment, which both the
// opening thread and the capture thread join. After `start` the clients are
// used from the capture thread only, and the session is handed back through
// the thread's join handle before `stop` and drop.
unsafe impl Send for WasapiCaptureSession {}

impl WasapiCaptureSession {
    fn open(request: &DeviceRequest, com: ComApartment) -> VcResult<Self> {
        let device = DeviceEnumerator::new()?.capture_device(request.device_index)?;
        if let Some(name) = friendly_name(&device) {
            log::info!("capture device {}: {}", request.device_index, name);
        }

        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_INPROC_SERVER, None)
                .map_err(|e| VoiceChangerError::DeviceUnavailable(format!("unable to activate audio client: {}", e)))?;

            let mut default_period = 0i64;
            let mut minimum_period = 0i64;
            audio_client
                .GetDevicePeriod(Some(&mut default_period as *mut i64), Some(&mut minimum_period as *mut i64))
                .map_err(|e| VoiceChangerError::DeviceError(format!("unable to get device period: {}", e)))?;
            log::info!("default device period: {} [ms]", default_period / 10_000);
            log::info!("minimum device period: {} [ms]", minimum_period / 10_000);

            let device_period = sizing::duration_from_hns(default_period);
            let buffer_period = sizing::buffer_period(device_period, request.latency_tier.multiplier());

            let format = mono_float_format(request.sample_rate);
            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_EVENTCALLBACK
                        | AUDCLNT_STREAMFLAGS_NOPERSIST
                        | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                        | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                    sizing::duration_to_hns(buffer_period),
                    0,
                    &format as *const WAVEFORMATEXTENSIBLE as *const WAVEFORMATEX,
                    None,
                )
                .map_err(|e| {
                    VoiceChangerError::FormatNegotiationFailed(format!(
                        "unable to initialize mono f32 at {} Hz: {}",
                        request.sample_rate, e
                    ))
                })?;

            let samples_ready = EventHandle::new("samples ready")?;
            let shutdown = Arc::new(EventHandle::new("shutdown")?);
            audio_client
                .SetEventHandle(samples_ready.0)
                .map_err(|e| VoiceChangerError::DeviceError(format!("unable to set ready event: {}", e)))?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| VoiceChangerError::DeviceError(format!("unable to get capture client: {}", e)))?;

            if let Ok(frames) = audio_client.GetBufferSize() {
                log::info!("endpoint buffer: {} [frames]", frames);
            }

            Ok(Self {
                capture_client,
                audio_client,
                samples_ready,
                shutdown,
                format: StreamFormat {
                    sample_rate: request.sample_rate,
                    device_period,
                    buffer_period,
                },
                thread_state: None,
                held_frames: 0,
                started: false,
                _com: com,
            })
        }
    }
}

fn mono_float_format(sample_rate: u32) -> WAVEFORMATEXTENSIBLE {
    let bits = 32u16;
    let block_align = bits / 8;
    WAVEFORMATEXTENSIBLE {
        Format: WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_EXTENSIBLE as u16,
            nChannels: 1,
            nSamplesPerSec: sample_rate,
            nAvgBytesPerSec: sample_rate * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: bits,
            cbSize: (std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>()) as u16,
        },
        Samples: WAVEFORMATEXTENSIBLE_0 {
            wValidBitsPerSample: bits,
        },
        dwChannelMask: SPEAKER_FRONT_CENTER,
        SubFormat: KSDATAFORMAT_SUBTYPE_IEEE_FLOAT,
    }
}

impl DeviceSession for WasapiCaptureSession {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn start(&mut self) -> VcResult<()> {
        if self.started {
            return Ok(());
        }
        unsafe { self.audio_client.Start() }
            .map_err(|e| VoiceChangerError::DeviceError(format!("unable to start audio client: {}", e)))?;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> VcResult<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        unsafe { self.audio_client.Stop() }
            .map_err(|e| VoiceChangerError::DeviceError(format!("unable to stop audio client: {}", e)))
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        Arc::clone(&self.shutdown) as ShutdownHandle
    }

    fn wait(&mut self) -> VcResult<Wake> {
        let events = [self.samples_ready.0, self.shutdown.0];
        let result = unsafe { WaitForMultipleObjects(&events, false, INFINITE) };
        if result == WAIT_OBJECT_0 {
            Ok(Wake::SamplesReady)
        } else if result == WAIT_EVENT(WAIT_OBJECT_0.0 + 1) {
            Ok(Wake::Shutdown)
        } else {
            Err(VoiceChangerError::DeviceError(format!(
                "WaitForMultipleObjects returned {:#x} (error {})",
                result.0,
                unsafe { GetLastError() }.0
            )))
        }
    }

    fn read(&mut self) -> VcResult<CapturePacket<'_>> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut frames = 0u32;
        let mut flags = 0u32;
        unsafe {
            self.capture_client
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .map_err(|e| VoiceChangerError::DeviceError(format!("GetBuffer failed: {}", e)))?;
        }
        self.held_frames = frames;

        let silent = flags & AUDCLNT_BUFFERFLAGS_SILENT.0 as u32 != 0;
        let samples: &[f32] = if silent || frames == 0 || data.is_null() {
            &[]
        } else {
            // SAFETY: shared-mode buffer of `frames` mono f32 samples, valid
            // until ReleaseBuffer, which needs `&mut self`.
            unsafe { std::slice::from_raw_parts(data as *const f32, frames as usize) }
        };

        Ok(CapturePacket {
            samples,
            frames: frames as usize,
            silent,
        })
    }

    fn release(&mut self, frames: usize) -> VcResult<()> {
        let frames = u32::try_from(frames)
            .map_err(|_| VoiceChangerError::DeviceError(format!("cannot release {} frames", frames)))?;
        if frames != self.held_frames {
            log::warn!("releasing {} frames, {} were read", frames, self.held_frames);
        }
        self.held_frames = 0;
        unsafe { self.capture_client.ReleaseBuffer(frames) }
            .map_err(|e| VoiceChangerError::DeviceError(format!("ReleaseBuffer failed: {}", e)))
    }

    fn attach_capture_thread(&mut self) -> VcResult<()> {
        let com = ComApartment::enter()?;
        let mmcss = MmcssRegistration::register()?;
        self.thread_state = Some(CaptureThreadState {
            _mmcss: mmcss,
            _com: com,
        });
        Ok(())
    }

    fn detach_capture_thread(&mut self) {
        self.thread_state = None;
    }
}

impl Drop for WasapiCaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
    }
}
