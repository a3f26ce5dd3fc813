use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An active capture endpoint, as listed for the device picker.
///
/// Only used at configuration time; the capture path refers to devices by
/// `index` into the enumerated collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: i32,
    pub name: String,
    pub id: String,
    pub is_default: bool,
}

/// Stream format agreed between a device session and the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Negotiated sample rate in Hz (mono, 32-bit float).
    pub sample_rate: u32,
    /// Device default period.
    pub device_period: Duration,
    /// Buffer period requested from the device (default period × latency tier).
    pub buffer_period: Duration,
}

/// A transformed block handed to the downstream sink.
///
/// `samples` always holds exactly one engine block of mono f32 frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioBlock<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
    /// Wall-clock capture time in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Device frames captured before the first frame of this block.
    pub frame_position: u64,
}

impl AudioBlock<'_> {
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    /// Stream time of the first frame derived from the frame position.
    pub fn stream_time(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frame_position * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Result of the engine handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub protocol_version: Version,
    pub engine_version: Version,
    pub sample_rate: u32,
    /// Frames per engine block.
    pub block_size: usize,
    /// Algorithmic latency in frames.
    pub sample_latency: u32,
}

impl EngineInfo {
    pub fn block_duration(&self) -> Duration {
        frames_to_duration(self.block_size as u64, self.sample_rate)
    }

    pub fn latency(&self) -> Duration {
        frames_to_duration(self.sample_latency as u64, self.sample_rate)
    }
}

/// `major.minor.revision` triple reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub revision: i32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Diagnostics for a capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub session_id: Option<String>,
    pub buffer_frames: usize,
    pub wakes: u64,
    pub packets: u64,
    pub frames_captured: u64,
    pub silent_packets: u64,
    pub blocks_emitted: u64,
    pub blocks_dropped: u64,
    pub engine_faults: u64,
}

pub(crate) fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(frames * 1_000_000_000 / sample_rate as u64)
}
