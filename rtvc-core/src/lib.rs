//! # rtvc-core
//!
//! Platform-agnostic real-time voice changer core.
//!
//! Pulls variable-length mono batches from a capture device, re-chunks them
//! into the fixed blocks a voice transformation engine consumes, runs the
//! engine in place and hands every transformed block to an [`AudioSink`].
//! Platform backends implement [`DeviceBackend`] and [`TransformEngine`] and
//! plug into the generic [`CaptureLoop`].
//!
//! ## Architecture
//!
//! ```text
//! rtvc-core (this crate)
//! ├── models/       ← VoiceChangerError, CaptureState, settings, properties
//! ├── params/       ← ParameterStore (atomics), VoiceSelection
//! ├── processing/   ← BlockSegmenter, buffer sizing
//! ├── engine/       ← TransformEngine, handshake, TransformInvoker, BypassEngine
//! ├── traits/       ← DeviceBackend, DeviceSession, AudioSink
//! ├── device/       ← SignalPair, in-memory capture backend
//! └── session/      ← CaptureLoop, VoiceChangerSource
//! ```

pub mod device;
pub mod engine;
pub mod models;
pub mod params;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use device::memory::{MemoryCaptureBackend, MemoryFeeder};
pub use device::signals::SignalPair;
pub use engine::bypass::BypassEngine;
pub use engine::transform::{EngineFault, EngineResult, TransformEngine};
pub use models::audio_models::{AudioBlock, CaptureDiagnostics, DeviceDescriptor, EngineInfo, StreamFormat, Version};
pub use models::config::{EngineConfig, LatencyTier, PitchShiftMode, VoiceChangerSettings};
pub use models::error::VoiceChangerError;
pub use models::properties::SourceProperties;
pub use models::state::CaptureState;
pub use params::store::{Parameter, ParameterSnapshot, ParameterStore};
pub use params::voice::VoiceSelection;
pub use processing::block_segmenter::{Batch, BlockSegmenter};
pub use session::capture_loop::CaptureLoop;
pub use session::source::VoiceChangerSource;
pub use traits::audio_sink::AudioSink;
pub use traits::device::{CapturePacket, DeviceBackend, DeviceRequest, DeviceSession, ShutdownHandle, ShutdownTrigger, Wake};
