use std::sync::Arc;

use crate::engine::transform::{handshake, voice_table, TransformEngine};
use crate::models::audio_models::{CaptureDiagnostics, EngineInfo};
use crate::models::config::{EngineConfig, VoiceChangerSettings};
use crate::models::error::VoiceChangerError;
use crate::models::properties::SourceProperties;
use crate::models::state::CaptureState;
use crate::params::store::ParameterStore;
use crate::session::capture_loop::CaptureLoop;
use crate::traits::audio_sink::AudioSink;
use crate::traits::device::DeviceBackend;

/// The voice changer as a host plugin sees it: created once, updated with
/// settings, asked for its property sheet, destroyed.
///
/// Parameter changes take effect on the next block. A change of device or
/// latency tier restarts capture.
pub struct VoiceChangerSource {
    engine: Arc<dyn TransformEngine>,
    backend: Arc<dyn DeviceBackend>,
    params: Arc<ParameterStore>,
    capture: CaptureLoop,
    settings: Option<VoiceChangerSettings>,
}

impl VoiceChangerSource {
    /// Handshake with the engine. Capture starts with the first `update`.
    pub fn new(
        engine: Arc<dyn TransformEngine>,
        backend: Arc<dyn DeviceBackend>,
        sink: Arc<dyn AudioSink>,
        config: &EngineConfig,
    ) -> Result<Self, VoiceChangerError> {
        let info = handshake(engine.as_ref(), config)?;
        log_engine_tables(engine.as_ref());

        let params = Arc::new(ParameterStore::new());
        let capture = CaptureLoop::new(
            Arc::clone(&backend),
            Arc::clone(&engine),
            sink,
            Arc::clone(&params),
            info,
        );

        Ok(Self {
            engine,
            backend,
            params,
            capture,
            settings: None,
        })
    }

    /// Apply host settings.
    ///
    /// Parameters are stored before routing is compared, so a restart picks
    /// them up from its first block. A failed start is logged and returned;
    /// the source stays silent until the next routing change or `restart`.
    pub fn update(&mut self, settings: &VoiceChangerSettings) -> Result<(), VoiceChangerError> {
        self.params.apply_settings(settings);
        self.settings = Some(settings.clone());

        let routing = self.params.routing();
        if routing.device_index == Some(settings.device) && routing.latency_tier == settings.latency {
            return Ok(());
        }

        log::info!(
            "routing changed: device {:?} -> {}, {} -> {}",
            routing.device_index,
            settings.device,
            routing.latency_tier,
            settings.latency
        );

        if routing.device_index.is_some() {
            if let Err(e) = self.capture.stop() {
                log::warn!("stop before reconfiguration failed: {}", e);
            }
        }
        self.params.set_routing(settings.device, settings.latency);

        if settings.device < 0 {
            return Ok(());
        }
        self.capture.start()
    }

    pub fn update_json(&mut self, json: &str) -> Result<(), VoiceChangerError> {
        let settings = VoiceChangerSettings::from_json(json)?;
        self.update(&settings)
    }

    /// Stop and start again with the current routing, e.g. after a device
    /// fault ended capture.
    pub fn restart(&mut self) -> Result<(), VoiceChangerError> {
        if let Err(e) = self.capture.stop() {
            log::warn!("stop before restart failed: {}", e);
        }
        self.capture.start()
    }

    /// Property sheet for the host UI. Enumeration failures leave the
    /// affected list empty.
    pub fn properties(&self) -> SourceProperties {
        let devices = self.backend.list_capture_devices().unwrap_or_else(|e| {
            log::warn!("failed to enumerate capture devices: {}", e);
            Vec::new()
        });
        let voices = voice_table(self.engine.as_ref()).unwrap_or_else(|e| {
            log::warn!("failed to enumerate voices: {}", e);
            Vec::new()
        });
        SourceProperties::build(&devices, &voices)
    }

    /// Stop capture, then release the engine's model.
    pub fn destroy(mut self) -> Result<(), VoiceChangerError> {
        let stopped = self.capture.stop();
        self.engine.destroy()?;
        log::info!("engine destroyed");
        stopped
    }

    pub fn settings(&self) -> Option<&VoiceChangerSettings> {
        self.settings.as_ref()
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn engine_info(&self) -> &EngineInfo {
        self.capture.engine_info()
    }

    pub fn state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_running()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.capture.diagnostics()
    }
}

impl Drop for VoiceChangerSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.stop() {
            log::warn!("stop on drop failed: {}", e);
        }
    }
}

fn log_engine_tables(engine: &dyn TransformEngine) {
    match engine.param_count() {
        Ok(count) => {
            for index in 0..count {
                match engine.param_name(index) {
                    Ok(name) => log::info!("param {}: {}", index, name),
                    Err(e) => log::warn!("param {}: {}", index, e),
                }
            }
        }
        Err(e) => log::warn!("{}", e),
    }

    match voice_table(engine) {
        Ok(voices) => {
            for (id, name) in voices {
                log::info!("voice {}: {}", id, name);
            }
        }
        Err(e) => log::warn!("{}", e),
    }
}
