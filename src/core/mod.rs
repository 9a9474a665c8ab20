pub mod audio_bridge;
pub mod stt;

// Re-export commonly used types for convenience
pub use audio_bridge::{AudioBridge, AudioFormat, AudioFrame, STTFactory, deepgram_factory};
pub use stt::{
    BaseSTT, DeepgramSTT, DeepgramSTTConfig, STTConfig, STTConnectionState, STTError,
    STTResultCallback, STTStats, TranscriptionMessage,
};
