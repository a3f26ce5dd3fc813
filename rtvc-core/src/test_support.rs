//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::engine::transform::{EngineFault, EngineResult, TransformEngine};
use crate::models::audio_models::{AudioBlock, Version};
use crate::models::error::VoiceChangerError;
use crate::models::state::CaptureState;
use crate::traits::audio_sink::AudioSink;

/// Engine calls that change engine state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Init(String),
    Destroy,
    SelectVoice(i32),
    SelectVoices(Vec<i32>, Vec<f32>),
    Transform { frames: usize, params: Vec<f32> },
}

const PARAM_NAMES: [&str; 5] = ["input_gain", "output_gain", "pitch_shift", "pitch_shift_mode", "pitch_snap"];

/// Engine that records calls and scales samples by `params[0] * params[1]`.
pub struct RecordingEngine {
    sample_rate: u32,
    block_size: usize,
    protocol_major: i32,
    voices: Vec<String>,
    calls: Mutex<Vec<EngineCall>>,
    failures: Mutex<HashMap<&'static str, i32>>,
    failing_transform: Mutex<Option<usize>>,
    transforms: AtomicUsize,
    model: Mutex<Option<String>>,
}

impl RecordingEngine {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            protocol_major: 1,
            voices: Vec::new(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            failing_transform: Mutex::new(None),
            transforms: AtomicUsize::new(0),
            model: Mutex::new(None),
        }
    }

    pub fn with_protocol_major(mut self, major: i32) -> Self {
        self.protocol_major = major;
        self
    }

    pub fn with_voices(mut self, names: &[&str]) -> Self {
        self.voices = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Make every call to the named entry point return `status`.
    pub fn fail_call(&self, call: &'static str, status: i32) {
        self.failures.lock().insert(call, status);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
        *self.failing_transform.lock() = None;
    }

    /// Fail only the `n`-th transform call (0-based).
    pub fn fail_transform_at(&self, n: usize) {
        *self.failing_transform.lock() = Some(n);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }

    pub fn initialized_model(&self) -> Option<String> {
        self.model.lock().clone()
    }

    fn check(&self, call: &'static str) -> EngineResult<()> {
        match self.failures.lock().get(call) {
            Some(&status) => Err(EngineFault::new(call, status)),
            None => Ok(()),
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

impl TransformEngine for RecordingEngine {
    fn protocol_version(&self) -> EngineResult<Version> {
        self.check("get_protocol_version")?;
        Ok(Version {
            major: self.protocol_major,
            minor: 0,
            revision: 0,
        })
    }

    fn init(&self, model: &str) -> EngineResult<()> {
        self.check("init")?;
        self.record(EngineCall::Init(model.to_string()));
        *self.model.lock() = Some(model.to_string());
        Ok(())
    }

    fn destroy(&self) -> EngineResult<()> {
        self.check("destroy")?;
        self.record(EngineCall::Destroy);
        *self.model.lock() = None;
        Ok(())
    }

    fn version(&self) -> EngineResult<Version> {
        self.check("get_version")?;
        Ok(Version {
            major: 2,
            minor: 1,
            revision: 0,
        })
    }

    fn sample_rate(&self) -> EngineResult<u32> {
        self.check("get_sample_rate")?;
        Ok(self.sample_rate)
    }

    fn sample_latency(&self) -> EngineResult<u32> {
        self.check("get_sample_latency")?;
        Ok(self.block_size as u32)
    }

    fn block_size(&self) -> EngineResult<usize> {
        self.check("get_block_size")?;
        Ok(self.block_size)
    }

    fn param_count(&self) -> EngineResult<usize> {
        self.check("get_num_params")?;
        Ok(PARAM_NAMES.len())
    }

    fn param_name(&self, index: usize) -> EngineResult<String> {
        self.check("get_param_name")?;
        PARAM_NAMES
            .get(index)
            .map(|n| n.to_string())
            .ok_or(EngineFault::new("get_param_name", -1))
    }

    fn voice_count(&self) -> EngineResult<usize> {
        self.check("get_num_voices")?;
        Ok(self.voices.len())
    }

    fn voice_name(&self, index: usize) -> EngineResult<String> {
        self.check("get_voice_name")?;
        self.voices
            .get(index)
            .cloned()
            .ok_or(EngineFault::new("get_voice_name", -1))
    }

    fn select_voice(&self, id: i32) -> EngineResult<()> {
        self.check("set_voice")?;
        self.record(EngineCall::SelectVoice(id));
        Ok(())
    }

    fn select_voices(&self, ids: &[i32], weights: &[f32]) -> EngineResult<()> {
        self.check("set_voices")?;
        self.record(EngineCall::SelectVoices(ids.to_vec(), weights.to_vec()));
        Ok(())
    }

    fn transform(&self, params: &[f32], block: &mut [f32]) -> EngineResult<()> {
        let n = self.transforms.fetch_add(1, Ordering::SeqCst);
        self.check("process")?;
        if *self.failing_transform.lock() == Some(n) {
            return Err(EngineFault::new("process", -1));
        }
        self.record(EngineCall::Transform {
            frames: block.len(),
            params: params.to_vec(),
        });
        let gain = params[0] * params[1];
        block.iter_mut().for_each(|s| *s *= gain);
        Ok(())
    }
}

/// A block as seen by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedBlock {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub timestamp_ns: u64,
    pub frame_position: u64,
}

#[derive(Default)]
struct Collected {
    blocks: Vec<CollectedBlock>,
    states: Vec<CaptureState>,
    errors: Vec<VoiceChangerError>,
}

/// Sink that keeps everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    inner: Mutex<Collected>,
    cond: Condvar,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<CollectedBlock> {
        self.inner.lock().blocks.clone()
    }

    /// Concatenated samples of every received block.
    pub fn samples(&self) -> Vec<f32> {
        self.inner
            .lock()
            .blocks
            .iter()
            .flat_map(|b| b.samples.iter().copied())
            .collect()
    }

    pub fn states(&self) -> Vec<CaptureState> {
        self.inner.lock().states.clone()
    }

    pub fn errors(&self) -> Vec<VoiceChangerError> {
        self.inner.lock().errors.clone()
    }

    pub fn wait_for_blocks(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| c.blocks.len() >= count)
    }

    pub fn wait_for_error(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| !c.errors.is_empty())
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Collected) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !done(&inner) {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return done(&inner);
            }
        }
        true
    }
}

impl AudioSink for CollectingSink {
    fn output_audio(&self, block: &AudioBlock<'_>) {
        self.inner.lock().blocks.push(CollectedBlock {
            samples: block.samples.to_vec(),
            sample_rate: block.sample_rate,
            timestamp_ns: block.timestamp_ns,
            frame_position: block.frame_position,
        });
        self.cond.notify_all();
    }

    fn on_state_changed(&self, state: CaptureState) {
        self.inner.lock().states.push(state);
        self.cond.notify_all();
    }

    fn on_error(&self, error: &VoiceChangerError) {
        self.inner.lock().errors.push(error.clone());
        self.cond.notify_all();
    }
}
