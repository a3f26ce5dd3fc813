//! Contract of the external voice-transformation engine.
//!
//! Mirrors the engine's exported entry points. Every call reports a status;
//! a non-zero status surfaces as [`EngineFault`]. Implementations are bound
//! once and shared as `Arc<dyn TransformEngine>`.

use thiserror::Error;

use crate::models::audio_models::{EngineInfo, Version};
use crate::models::config::EngineConfig;
use crate::models::error::VoiceChangerError;

/// A non-zero status returned by an engine entry point.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("engine call `{call}` returned status {status}")]
pub struct EngineFault {
    pub call: &'static str,
    pub status: i32,
}

impl EngineFault {
    pub fn new(call: &'static str, status: i32) -> Self {
        Self { call, status }
    }

    /// Map a raw status code: zero is success.
    pub fn check(call: &'static str, status: i32) -> Result<(), Self> {
        if status == 0 {
            Ok(())
        } else {
            Err(Self::new(call, status))
        }
    }
}

pub type EngineResult<T> = Result<T, EngineFault>;

/// Voice transformation engine.
///
/// Calls are stateful on the engine side: a voice selection stays in effect
/// for every following `transform` call.
pub trait TransformEngine: Send + Sync {
    fn protocol_version(&self) -> EngineResult<Version>;

    /// Load the named model.
    fn init(&self, model: &str) -> EngineResult<()>;

    fn destroy(&self) -> EngineResult<()>;

    fn version(&self) -> EngineResult<Version>;

    fn sample_rate(&self) -> EngineResult<u32>;

    /// Algorithmic latency in frames.
    fn sample_latency(&self) -> EngineResult<u32>;

    /// Frames consumed and produced by one `transform` call.
    fn block_size(&self) -> EngineResult<usize>;

    fn param_count(&self) -> EngineResult<usize>;

    fn param_name(&self, index: usize) -> EngineResult<String>;

    fn voice_count(&self) -> EngineResult<usize>;

    fn voice_name(&self, index: usize) -> EngineResult<String>;

    fn select_voice(&self, id: i32) -> EngineResult<()>;

    /// Mix several voices; `weights` sum to 1.
    fn select_voices(&self, ids: &[i32], weights: &[f32]) -> EngineResult<()>;

    /// Transform exactly one block in place.
    fn transform(&self, params: &[f32], block: &mut [f32]) -> EngineResult<()>;
}

/// Negotiate with the engine and read its stream parameters.
///
/// Checks the protocol major version, loads the configured model and reads
/// version, sample rate, latency and block size. Any failure is an
/// [`VoiceChangerError::InitializationFault`].
pub fn handshake(
    engine: &dyn TransformEngine,
    config: &EngineConfig,
) -> Result<EngineInfo, VoiceChangerError> {
    let init_fault =
        |e: EngineFault| VoiceChangerError::InitializationFault(format!("could not {}: status {}", e.call, e.status));

    let protocol_version = engine.protocol_version().map_err(init_fault)?;
    log::info!("protocol version: {}", protocol_version);
    if protocol_version.major != config.protocol_major {
        log::error!("unsupported protocol version: {}", protocol_version);
        return Err(VoiceChangerError::InitializationFault(format!(
            "unsupported protocol version {} (expected major {})",
            protocol_version, config.protocol_major
        )));
    }

    engine.init(&config.model).map_err(init_fault)?;
    log::info!("init: {}", config.model);

    let engine_version = engine.version().map_err(init_fault)?;
    log::info!("version: {}", engine_version);

    let sample_rate = engine.sample_rate().map_err(init_fault)?;
    if sample_rate == 0 {
        return Err(VoiceChangerError::InitializationFault(
            "engine reported a zero sample rate".into(),
        ));
    }
    log::info!("sample rate: {} [hz]", sample_rate);

    let sample_latency = engine.sample_latency().map_err(init_fault)?;

    let block_size = engine.block_size().map_err(init_fault)?;
    if block_size == 0 {
        return Err(VoiceChangerError::InitializationFault(
            "engine reported a zero block size".into(),
        ));
    }

    let info = EngineInfo {
        protocol_version,
        engine_version,
        sample_rate,
        block_size,
        sample_latency,
    };
    log::info!("sample latency: {} [ms]", info.latency().as_millis());
    log::info!("block size: {} [ms]", info.block_duration().as_millis());
    Ok(info)
}

/// Voice ids and names, skipping entries the engine fails to name.
pub fn voice_table(engine: &dyn TransformEngine) -> EngineResult<Vec<(i32, String)>> {
    let count = engine.voice_count()?;
    let mut voices = Vec::with_capacity(count);
    for index in 0..count {
        match engine.voice_name(index) {
            Ok(name) => voices.push((index as i32, name)),
            Err(e) => log::warn!("skipping voice {}: {}", index, e),
        }
    }
    Ok(voices)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::RecordingEngine;

    #[test]
    fn status_check() {
        assert!(EngineFault::check("process", 0).is_ok());
        assert_eq!(
            EngineFault::check("process", -2),
            Err(EngineFault::new("process", -2))
        );
    }

    #[test]
    fn handshake_reads_stream_parameters() {
        let engine = RecordingEngine::new(24_000, 256);
        let info = handshake(&engine, &EngineConfig::default()).unwrap();

        assert_eq!(info.sample_rate, 24_000);
        assert_eq!(info.block_size, 256);
        assert_eq!(info.protocol_version.major, 1);
        assert_eq!(info.block_duration(), Duration::from_nanos(10_666_666));
        assert_eq!(info.latency(), info.block_duration());
        assert_eq!(engine.initialized_model().as_deref(), Some("jvs100"));
    }

    #[test]
    fn handshake_rejects_protocol_mismatch() {
        let engine = RecordingEngine::new(24_000, 256).with_protocol_major(2);
        let err = handshake(&engine, &EngineConfig::default()).unwrap_err();

        assert!(matches!(err, VoiceChangerError::InitializationFault(_)));
        assert_eq!(engine.initialized_model(), None);
    }

    #[test]
    fn handshake_reports_init_failure() {
        let engine = RecordingEngine::new(24_000, 256);
        engine.fail_call("init", 5);
        let err = handshake(&engine, &EngineConfig::default()).unwrap_err();

        assert_eq!(
            err,
            VoiceChangerError::InitializationFault("could not init: status 5".into())
        );
    }

    #[test]
    fn voice_table_skips_failed_names() {
        let engine = RecordingEngine::new(24_000, 256).with_voices(&["a", "b", "c"]);
        engine.fail_call("get_voice_name", 1);
        assert!(voice_table(&engine).unwrap().is_empty());

        engine.clear_failures();
        let voices = voice_table(&engine).unwrap();
        assert_eq!(voices, vec![(0, "a".into()), (1, "b".into()), (2, "c".into())]);
    }
}
