//! # rtvc-windows
//!
//! Windows backends for rtvc-core.
//!
//! Provides:
//! - `WasapiCaptureBackend`: event-driven WASAPI capture of a mono float stream
//! - `DeviceEnumerator`: active capture endpoints via the MMDevice API
//! - `VvfxEngine`: the dynamically loaded VVFX voice conversion runtime
//!
//! ## Platform Requirements
//! - Windows 10+, with the VVFX runtime installed under Common Files or
//!   next to the host module
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use rtvc_core::{EngineConfig, VoiceChangerSettings, VoiceChangerSource};
//! use rtvc_windows::{VvfxEngine, WasapiCaptureBackend};
//!
//! let engine = Arc::new(VvfxEngine::load()?);
//! let mut source = VoiceChangerSource::new(
//!     engine,
//!     Arc::new(WasapiCaptureBackend::new()),
//!     sink,
//!     &EngineConfig::default(),
//! )?;
//! source.update(&VoiceChangerSettings::default())?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod vvfx_engine;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use vvfx_engine::VvfxEngine;
#[cfg(target_os = "windows")]
pub use wasapi_capture::{WasapiCaptureBackend, WasapiCaptureSession};
