use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use super::transform::{EngineFault, EngineResult, TransformEngine};
use crate::models::audio_models::Version;

const PARAM_NAMES: [&str; 5] = ["input_gain", "output_gain", "pitch_shift", "pitch_shift_mode", "pitch_snap"];

/// Status returned when `process` runs before `init`.
pub const STATUS_NOT_INITIALIZED: i32 = 1;
/// Status returned for malformed arguments.
pub const STATUS_INVALID_ARGUMENT: i32 = 2;

/// Gain-only engine for headless use and for hosts without the VVFX runtime.
///
/// Applies `input_gain * output_gain` to every sample and ignores pitch and
/// voice parameters. Any voice id is accepted.
pub struct BypassEngine {
    sample_rate: u32,
    block_size: usize,
    voices: Vec<String>,
    initialized: AtomicBool,
    active_voice: AtomicI32,
}

impl BypassEngine {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            voices: Vec::new(),
            initialized: AtomicBool::new(false),
            active_voice: AtomicI32::new(-1),
        }
    }

    pub fn with_voices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.voices = names.into_iter().map(Into::into).collect();
        self
    }

    /// Primary voice of the last selection, `-1` before any selection.
    pub fn active_voice(&self) -> i32 {
        self.active_voice.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl Default for BypassEngine {
    fn default() -> Self {
        Self::new(24_000, 256)
    }
}

impl TransformEngine for BypassEngine {
    fn protocol_version(&self) -> EngineResult<Version> {
        Ok(Version {
            major: 1,
            minor: 0,
            revision: 0,
        })
    }

    fn init(&self, model: &str) -> EngineResult<()> {
        log::debug!("bypass engine ignoring model {}", model);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn destroy(&self) -> EngineResult<()> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }

    fn version(&self) -> EngineResult<Version> {
        Ok(Version::default())
    }

    fn sample_rate(&self) -> EngineResult<u32> {
        Ok(self.sample_rate)
    }

    fn sample_latency(&self) -> EngineResult<u32> {
        Ok(0)
    }

    fn block_size(&self) -> EngineResult<usize> {
        Ok(self.block_size)
    }

    fn param_count(&self) -> EngineResult<usize> {
        Ok(PARAM_NAMES.len())
    }

    fn param_name(&self, index: usize) -> EngineResult<String> {
        PARAM_NAMES
            .get(index)
            .map(|n| n.to_string())
            .ok_or(EngineFault::new("get_param_name", STATUS_INVALID_ARGUMENT))
    }

    fn voice_count(&self) -> EngineResult<usize> {
        Ok(self.voices.len())
    }

    fn voice_name(&self, index: usize) -> EngineResult<String> {
        self.voices
            .get(index)
            .cloned()
            .ok_or(EngineFault::new("get_voice_name", STATUS_INVALID_ARGUMENT))
    }

    fn select_voice(&self, id: i32) -> EngineResult<()> {
        self.active_voice.store(id, Ordering::Relaxed);
        Ok(())
    }

    fn select_voices(&self, ids: &[i32], weights: &[f32]) -> EngineResult<()> {
        if ids.is_empty() || ids.len() != weights.len() {
            return Err(EngineFault::new("set_voices", STATUS_INVALID_ARGUMENT));
        }
        self.active_voice.store(ids[0], Ordering::Relaxed);
        Ok(())
    }

    fn transform(&self, params: &[f32], block: &mut [f32]) -> EngineResult<()> {
        if !self.is_initialized() {
            return Err(EngineFault::new("process", STATUS_NOT_INITIALIZED));
        }
        if block.len() != self.block_size || params.len() < 2 {
            return Err(EngineFault::new("process", STATUS_INVALID_ARGUMENT));
        }
        let gain = params[0] * params[1];
        for sample in block.iter_mut() {
            *sample *= gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::engine::transform::{handshake, voice_table};
    use crate::models::config::EngineConfig;

    #[test]
    fn passes_handshake() {
        let engine = BypassEngine::new(48_000, 480);
        let info = handshake(&engine, &EngineConfig::default()).unwrap();

        assert_eq!(info.sample_rate, 48_000);
        assert_eq!(info.block_size, 480);
        assert!(engine.is_initialized());
    }

    #[test]
    fn applies_combined_gain() {
        let engine = BypassEngine::new(24_000, 4);
        engine.init("jvs100").unwrap();
        let mut block = [0.5, -0.5, 1.0, 0.0];

        engine.transform(&[2.0, 0.5, 0.3, 1.0, 0.0], &mut block).unwrap();
        assert_relative_eq!(block[0], 0.5);
        assert_relative_eq!(block[1], -0.5);

        engine.transform(&[2.0, 2.0, 0.0, 0.0, 0.0], &mut block).unwrap();
        assert_relative_eq!(block[2], 4.0);
    }

    #[test]
    fn rejects_process_before_init() {
        let engine = BypassEngine::new(24_000, 4);
        let mut block = [0.0; 4];

        assert_eq!(
            engine.transform(&[1.0, 1.0, 0.0, 1.0, 0.0], &mut block),
            Err(EngineFault::new("process", STATUS_NOT_INITIALIZED))
        );
    }

    #[test]
    fn rejects_wrong_block_length() {
        let engine = BypassEngine::new(24_000, 4);
        engine.init("jvs100").unwrap();
        let mut block = [0.0; 3];

        assert!(engine.transform(&[1.0, 1.0, 0.0, 1.0, 0.0], &mut block).is_err());
    }

    #[test]
    fn tracks_selection() {
        let engine = BypassEngine::default();
        assert_eq!(engine.active_voice(), -1);

        engine.select_voice(7).unwrap();
        assert_eq!(engine.active_voice(), 7);

        engine.select_voices(&[3, 9], &[0.4, 0.6]).unwrap();
        assert_eq!(engine.active_voice(), 3);
        assert!(engine.select_voices(&[3, 9], &[1.0]).is_err());
    }

    #[test]
    fn lists_configured_voices() {
        let engine = BypassEngine::default().with_voices(["alto", "tenor"]);
        assert_eq!(
            voice_table(&engine).unwrap(),
            vec![(0, "alto".to_string()), (1, "tenor".to_string())]
        );
        assert_eq!(engine.param_name(3).unwrap(), "pitch_shift_mode");
    }
}
