use thiserror::Error;

use crate::engine::transform::EngineFault;

/// Errors raised by the voice changer engine.
///
/// Start-time device failures (`DeviceUnavailable`, `FormatNegotiationFailed`)
/// leave no capture thread behind and may be retried with other settings.
/// `DeviceError` ends a running capture thread. `EngineFault` is per block:
/// the block is dropped and capture continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceChangerError {
    #[error("engine initialization failed: {0}")]
    InitializationFault(String),

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),

    #[error("device error: {0}")]
    DeviceError(String),

    #[error("engine call `{call}` failed with status {status}")]
    EngineFault { call: &'static str, status: i32 },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<EngineFault> for VoiceChangerError {
    fn from(fault: EngineFault) -> Self {
        Self::EngineFault {
            call: fault.call,
            status: fault.status,
        }
    }
}
