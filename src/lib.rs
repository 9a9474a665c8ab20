pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use crate::config::StreamConfig;
pub use crate::core::{
    AudioBridge, AudioFormat, AudioFrame, BaseSTT, DeepgramSTT, DeepgramSTTConfig,
    STTConnectionState, STTError, STTStats, TranscriptionMessage,
};
