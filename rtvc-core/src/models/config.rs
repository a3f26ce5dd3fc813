use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::VoiceChangerError;

/// Latency tier: a discrete multiplier applied to the device default period
/// to size the capture buffer.
///
/// Serialized as its multiplier (1..=13), matching the host's integer
/// settings value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LatencyTier {
    Minimum = 1,
    UltraLow,
    HyperLow,
    SuperLow,
    VeryLow,
    Low,
    Middle,
    High,
    VeryHigh,
    SuperHigh,
    HyperHigh,
    UltraHigh,
    Maximum,
}

impl LatencyTier {
    pub const ALL: [LatencyTier; 13] = [
        Self::Minimum,
        Self::UltraLow,
        Self::HyperLow,
        Self::SuperLow,
        Self::VeryLow,
        Self::Low,
        Self::Middle,
        Self::High,
        Self::VeryHigh,
        Self::SuperHigh,
        Self::HyperHigh,
        Self::UltraHigh,
        Self::Maximum,
    ];

    /// Multiplier applied to the device default period.
    pub fn multiplier(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Minimum => "minimum-latency",
            Self::UltraLow => "ultra_low-latency",
            Self::HyperLow => "hyper_low-latency",
            Self::SuperLow => "super_low-latency",
            Self::VeryLow => "very_low-latency",
            Self::Low => "low-latency",
            Self::Middle => "middle-latency",
            Self::High => "high-latency",
            Self::VeryHigh => "very_high-latency",
            Self::SuperHigh => "super_high-latency",
            Self::HyperHigh => "hyper_high-latency",
            Self::UltraHigh => "ultra_high-latency",
            Self::Maximum => "maximum-latency",
        }
    }

    pub fn from_multiplier(value: u32) -> Option<Self> {
        Self::ALL.get((value as usize).checked_sub(1)?).copied()
    }
}

impl Default for LatencyTier {
    fn default() -> Self {
        Self::ALL[Self::ALL.len() / 2]
    }
}

impl TryFrom<i64> for LatencyTier {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(Self::from_multiplier)
            .ok_or_else(|| format!("latency tier out of range: {} (expected 1..=13)", value))
    }
}

impl From<LatencyTier> for i64 {
    fn from(tier: LatencyTier) -> Self {
        tier.multiplier() as i64
    }
}

impl fmt::Display for LatencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pitch-shift algorithm selection understood by the transform engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PitchShiftMode {
    Song = 0,
    Talk = 1,
}

impl PitchShiftMode {
    /// Value passed in the engine's parameter vector.
    pub fn as_param(self) -> f32 {
        self as u32 as f32
    }

    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Song),
            1 => Some(Self::Talk),
            _ => None,
        }
    }
}

impl Default for PitchShiftMode {
    fn default() -> Self {
        Self::Talk
    }
}

impl TryFrom<i64> for PitchShiftMode {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(Self::from_raw)
            .ok_or_else(|| format!("unknown pitch shift mode: {}", value))
    }
}

impl From<PitchShiftMode> for i64 {
    fn from(mode: PitchShiftMode) -> Self {
        mode as i64
    }
}

/// Host-facing settings in user units (dB, cents, percent).
///
/// Field names match the keys the host stores. Values are not range-checked;
/// the host UI owns the ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceChangerSettings {
    /// Index into the enumerated active capture endpoints.
    pub device: i32,
    pub latency: LatencyTier,
    /// Input gain in dB.
    pub input_gain: f64,
    /// Output gain in dB.
    pub output_gain: f64,
    /// Pitch shift in cents.
    pub pitch_shift: f64,
    pub pitch_shift_mode: PitchShiftMode,
    /// Pitch snap in percent.
    pub pitch_snap: f64,
    pub primary_voice: i32,
    /// Secondary voice id, `-1` disables blending.
    pub secondary_voice: i32,
    /// Blend amount in percent.
    pub amount: f64,
}

impl VoiceChangerSettings {
    /// Parse settings from the host's JSON representation.
    ///
    /// Missing keys take their defaults, unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self, VoiceChangerError> {
        serde_json::from_str(json).map_err(|e| {
            VoiceChangerError::ConfigurationFailed(format!("invalid settings: {}", e))
        })
    }

    pub fn to_json(&self) -> Result<String, VoiceChangerError> {
        serde_json::to_string(self).map_err(|e| {
            VoiceChangerError::ConfigurationFailed(format!("failed to serialize settings: {}", e))
        })
    }
}

impl Default for VoiceChangerSettings {
    fn default() -> Self {
        Self {
            device: 0,
            latency: LatencyTier::default(),
            input_gain: 0.0,
            output_gain: 0.0,
            pitch_shift: 0.0,
            pitch_shift_mode: PitchShiftMode::Talk,
            pitch_snap: 0.0,
            primary_voice: 100,
            secondary_voice: -1,
            amount: 0.0,
        }
    }
}

/// Engine handshake configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Model name passed to the engine's `init` entry point.
    pub model: String,

    /// Protocol major version this host speaks.
    pub protocol_major: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "jvs100".into(),
            protocol_major: 1,
        }
    }
}

/// Convert decibels to a linear gain multiplier.
pub fn db_to_linear(db: f64) -> f32 {
    10f64.powf(db * 0.05) as f32
}

/// Convert cents to the engine's log-domain pitch unit (`ln` of the ratio).
pub fn cents_to_log_ratio(cents: f64) -> f32 {
    (cents * (std::f64::consts::LN_2 / 1200.0)) as f32
}

pub fn percent_to_fraction(percent: f64) -> f32 {
    (percent * 0.01) as f32
}
