pub mod audio_sink;
pub mod device;
