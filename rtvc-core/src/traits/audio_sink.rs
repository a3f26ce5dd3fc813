use crate::models::audio_models::AudioBlock;
use crate::models::error::VoiceChangerError;
use crate::models::state::CaptureState;

/// Downstream consumer of transformed audio and capture events.
///
/// `output_audio` runs on the capture thread once per block and must not
/// block. The event methods are called from either the control thread or the
/// capture thread; implementations should marshal elsewhere if needed.
pub trait AudioSink: Send + Sync {
    /// Receive one transformed mono block.
    fn output_audio(&self, block: &AudioBlock<'_>);

    /// Called when the capture state changes.
    fn on_state_changed(&self, _state: CaptureState) {}

    /// Called when a device fault ends capture.
    fn on_error(&self, _error: &VoiceChangerError) {}
}
