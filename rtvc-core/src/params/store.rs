//! Lock-free parameter store shared between the control path and the
//! capture thread.
//!
//! Every field is its own atomic. Readers get a per-field value that is
//! current at read time; there is no transaction across fields, so a block
//! may see a mix of old and new values for at most one block.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::models::config::{
    cents_to_log_ratio, db_to_linear, percent_to_fraction, LatencyTier, PitchShiftMode,
    VoiceChangerSettings,
};

/// f32 stored as its bit pattern.
#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// A single typed write into the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    /// Linear input gain multiplier.
    InputGain(f32),
    /// Linear output gain multiplier.
    OutputGain(f32),
    /// Pitch shift in the engine's log-domain unit.
    PitchShift(f32),
    PitchShiftMode(PitchShiftMode),
    /// Pitch snap fraction in `[0, 1]`.
    PitchSnap(f32),
    PrimaryVoice(i32),
    /// Secondary voice id, negative disables blending.
    SecondaryVoice(i32),
    /// Blend amount fraction in `[0, 1]`.
    BlendAmount(f32),
}

/// Values read by the capture thread for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub input_gain: f32,
    pub output_gain: f32,
    pub pitch_shift: f32,
    pub pitch_shift_mode: PitchShiftMode,
    pub pitch_snap: f32,
    pub primary_voice: i32,
    pub secondary_voice: i32,
    pub blend_amount: f32,
}

/// Number of entries in the engine parameter vector.
pub const ENGINE_PARAM_COUNT: usize = 5;

impl ParameterSnapshot {
    /// Parameter vector in the order the engine expects.
    pub fn engine_params(&self) -> [f32; ENGINE_PARAM_COUNT] {
        [
            self.input_gain,
            self.output_gain,
            self.pitch_shift,
            self.pitch_shift_mode.as_param(),
            self.pitch_snap,
        ]
    }
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            input_gain: 1.0,
            output_gain: 1.0,
            pitch_shift: 0.0,
            pitch_shift_mode: PitchShiftMode::Talk,
            pitch_snap: 0.0,
            primary_voice: 0,
            secondary_voice: 0,
            blend_amount: 0.0,
        }
    }
}

/// Device routing as last written by the control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routing {
    /// Device index, `None` until a device has been configured.
    pub device_index: Option<i32>,
    pub latency_tier: LatencyTier,
}

#[derive(Debug)]
pub struct ParameterStore {
    input_gain: AtomicF32,
    output_gain: AtomicF32,
    pitch_shift: AtomicF32,
    pitch_shift_mode: AtomicU32,
    pitch_snap: AtomicF32,
    primary_voice: AtomicI32,
    secondary_voice: AtomicI32,
    blend_amount: AtomicF32,

    device_index: AtomicI32,
    latency_tier: AtomicU32,
}

impl ParameterStore {
    pub fn new() -> Self {
        let d = ParameterSnapshot::default();
        Self {
            input_gain: AtomicF32::new(d.input_gain),
            output_gain: AtomicF32::new(d.output_gain),
            pitch_shift: AtomicF32::new(d.pitch_shift),
            pitch_shift_mode: AtomicU32::new(d.pitch_shift_mode as u32),
            pitch_snap: AtomicF32::new(d.pitch_snap),
            primary_voice: AtomicI32::new(d.primary_voice),
            secondary_voice: AtomicI32::new(d.secondary_voice),
            blend_amount: AtomicF32::new(d.blend_amount),
            device_index: AtomicI32::new(-1),
            latency_tier: AtomicU32::new(LatencyTier::default().multiplier()),
        }
    }

    pub fn set(&self, parameter: Parameter) {
        match parameter {
            Parameter::InputGain(v) => self.input_gain.store(v),
            Parameter::OutputGain(v) => self.output_gain.store(v),
            Parameter::PitchShift(v) => self.pitch_shift.store(v),
            Parameter::PitchShiftMode(m) => self.pitch_shift_mode.store(m as u32, Ordering::Release),
            Parameter::PitchSnap(v) => self.pitch_snap.store(v),
            Parameter::PrimaryVoice(id) => self.primary_voice.store(id, Ordering::Release),
            Parameter::SecondaryVoice(id) => self.secondary_voice.store(id, Ordering::Release),
            Parameter::BlendAmount(v) => self.blend_amount.store(v),
        }
    }

    pub fn input_gain(&self) -> f32 {
        self.input_gain.load()
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain.load()
    }

    pub fn pitch_shift(&self) -> f32 {
        self.pitch_shift.load()
    }

    pub fn pitch_shift_mode(&self) -> PitchShiftMode {
        PitchShiftMode::from_raw(self.pitch_shift_mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn pitch_snap(&self) -> f32 {
        self.pitch_snap.load()
    }

    pub fn primary_voice(&self) -> i32 {
        self.primary_voice.load(Ordering::Acquire)
    }

    pub fn secondary_voice(&self) -> i32 {
        self.secondary_voice.load(Ordering::Acquire)
    }

    pub fn blend_amount(&self) -> f32 {
        self.blend_amount.load()
    }

    /// Read every field once. Not atomic across fields.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            input_gain: self.input_gain(),
            output_gain: self.output_gain(),
            pitch_shift: self.pitch_shift(),
            pitch_shift_mode: self.pitch_shift_mode(),
            pitch_snap: self.pitch_snap(),
            primary_voice: self.primary_voice(),
            secondary_voice: self.secondary_voice(),
            blend_amount: self.blend_amount(),
        }
    }

    pub fn routing(&self) -> Routing {
        let index = self.device_index.load(Ordering::Acquire);
        Routing {
            device_index: (index >= 0).then_some(index),
            latency_tier: LatencyTier::from_multiplier(self.latency_tier.load(Ordering::Acquire))
                .unwrap_or_default(),
        }
    }

    pub fn set_routing(&self, device_index: i32, latency_tier: LatencyTier) {
        self.device_index.store(device_index, Ordering::Release);
        self.latency_tier.store(latency_tier.multiplier(), Ordering::Release);
    }

    /// Convert host settings into engine units and store them.
    ///
    /// Routing is not touched; restarts are decided by the caller.
    pub fn apply_settings(&self, settings: &VoiceChangerSettings) {
        self.set(Parameter::InputGain(db_to_linear(settings.input_gain)));
        self.set(Parameter::OutputGain(db_to_linear(settings.output_gain)));
        self.set(Parameter::PitchShift(cents_to_log_ratio(settings.pitch_shift)));
        self.set(Parameter::PitchShiftMode(settings.pitch_shift_mode));
        self.set(Parameter::PitchSnap(percent_to_fraction(settings.pitch_snap)));
        self.set(Parameter::PrimaryVoice(settings.primary_voice));
        self.set(Parameter::SecondaryVoice(settings.secondary_voice));
        self.set(Parameter::BlendAmount(percent_to_fraction(settings.amount)));
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn set_then_get() {
        let store = ParameterStore::new();
        store.set(Parameter::InputGain(0.5));
        store.set(Parameter::PitchShiftMode(PitchShiftMode::Song));
        store.set(Parameter::SecondaryVoice(-1));

        assert_eq!(store.input_gain(), 0.5);
        assert_eq!(store.pitch_shift_mode(), PitchShiftMode::Song);
        assert_eq!(store.secondary_voice(), -1);
    }

    #[test]
    fn out_of_range_values_stored_as_is() {
        let store = ParameterStore::new();
        store.set(Parameter::BlendAmount(3.5));
        store.set(Parameter::PitchSnap(-1.0));

        assert_eq!(store.blend_amount(), 3.5);
        assert_eq!(store.pitch_snap(), -1.0);
    }

    #[test]
    fn apply_settings_converts_units() {
        let store = ParameterStore::new();
        let settings = VoiceChangerSettings {
            input_gain: 6.0,
            output_gain: -6.0,
            pitch_shift: 1200.0,
            pitch_snap: 40.0,
            primary_voice: 3,
            secondary_voice: 5,
            amount: 30.0,
            ..Default::default()
        };
        store.apply_settings(&settings);
        let snap = store.snapshot();

        assert_relative_eq!(snap.input_gain, 1.995_262_3, epsilon = 1e-5);
        assert_relative_eq!(snap.output_gain, 0.501_187_2, epsilon = 1e-5);
        assert_relative_eq!(snap.pitch_shift, std::f32::consts::LN_2, epsilon = 1e-6);
        assert_relative_eq!(snap.pitch_snap, 0.4, epsilon = 1e-6);
        assert_relative_eq!(snap.blend_amount, 0.3, epsilon = 1e-6);
        assert_eq!(snap.primary_voice, 3);
        assert_eq!(snap.secondary_voice, 5);
        assert_eq!(snap.pitch_shift_mode, PitchShiftMode::Talk);
    }

    #[test]
    fn engine_param_order() {
        let snap = ParameterSnapshot {
            input_gain: 1.5,
            output_gain: 0.5,
            pitch_shift: 0.1,
            pitch_shift_mode: PitchShiftMode::Song,
            pitch_snap: 0.25,
            ..Default::default()
        };
        assert_eq!(snap.engine_params(), [1.5, 0.5, 0.1, 0.0, 0.25]);
    }

    #[test]
    fn routing_unset_until_configured() {
        let store = ParameterStore::new();
        assert_eq!(store.routing().device_index, None);
        assert_eq!(store.routing().latency_tier, LatencyTier::Middle);

        store.set_routing(2, LatencyTier::Low);
        assert_eq!(
            store.routing(),
            Routing {
                device_index: Some(2),
                latency_tier: LatencyTier::Low
            }
        );
    }

    #[test]
    fn concurrent_writer_and_reader() {
        let store = Arc::new(ParameterStore::new());
        store.set(Parameter::OutputGain(0.0));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000 {
                    store.set(Parameter::OutputGain(i as f32));
                }
            })
        };

        let mut last = 0.0f32;
        for _ in 0..1000 {
            let v = store.output_gain();
            assert!(v >= last);
            last = v;
        }
        writer.join().unwrap();
        assert_eq!(store.output_gain(), 999.0);
    }
}
