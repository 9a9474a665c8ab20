mod base;
pub mod deepgram;

// Re-export public types and traits
pub use base::{
    BaseSTT, STTConnectionState, STTError, STTErrorCallback, STTResultCallback, STTStats,
};

// Re-export Deepgram implementation
pub use deepgram::{
    AudioSender, DeepgramSTT, DeepgramSTTConfig, EventLoop, STTConfig, StreamTimeouts,
    TranscriptionMessage, Waker, logging_sink,
};
