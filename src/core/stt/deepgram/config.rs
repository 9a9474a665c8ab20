//! Configuration types for the Deepgram streaming client.

use std::time::Duration;

use super::assembler::{DEFAULT_MAX_PENDING_BYTES, DEFAULT_READ_CHUNK_SIZE};
use super::connection::ConnectRequest;
use crate::core::stt::base::STTError;

/// Default streaming endpoint
pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Audio format and credentials shared by every provider
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct STTConfig {
    /// API key for the STT provider
    pub api_key: String,
    /// Language code for transcription (e.g., "en-US"); empty lets the model decide
    pub language: String,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
    /// Number of audio channels (1 for mono, 2 for stereo)
    pub channels: u16,
    /// Encoding of the audio (e.g., "linear16", "opus")
    pub encoding: String,
    /// Model to use for transcription
    pub model: String,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: String::new(),
            sample_rate: 16000,
            channels: 1,
            encoding: "linear16".to_string(),
            model: "nova-2".to_string(),
        }
    }
}

/// Socket timeouts for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamTimeouts {
    /// Bound on the whole handshake
    pub connect: Duration,
    /// How long `send` waits for the socket to accept another frame
    pub send: Duration,
    /// Bound on writing one frame
    pub write: Duration,
    /// Bound on waiting for the peer's close reply
    pub read: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            send: Duration::from_secs(2),
            write: Duration::from_secs(10),
            read: Duration::from_secs(10),
        }
    }
}

/// Configuration specific to Deepgram STT
#[derive(Debug, Clone, PartialEq)]
pub struct DeepgramSTTConfig {
    /// Base STT configuration
    pub base: STTConfig,
    /// Streaming endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    /// Enable smart formatting
    pub smart_format: bool,
    /// Enable speaker diarization
    pub diarize: bool,
    /// Enable utterance segmentation
    pub utterances: bool,
    /// Request interim results; `None` leaves the service default
    pub interim_results: Option<bool>,
    /// Request punctuation; `None` leaves the service default
    pub punctuate: Option<bool>,
    /// Endpointing silence threshold in milliseconds
    pub endpointing: Option<u32>,
    /// Additional query parameters appended after the built-in ones
    pub extra_params: Vec<(String, String)>,
    /// Additional request headers sent with the handshake
    pub extra_headers: Vec<(String, String)>,
    pub timeouts: StreamTimeouts,
    /// Capacity of the hand-off channel between `send` and the reactor
    pub outbound_queue: usize,
    /// Fallback interval at which the reactor checks for queued frames
    pub reactor_tick: Duration,
    /// Frames drained from the socket per readiness event
    pub max_reads_per_event: usize,
    pub read_chunk_size: usize,
    pub max_pending_bytes: usize,
}

impl Default for DeepgramSTTConfig {
    fn default() -> Self {
        Self {
            base: STTConfig::default(),
            endpoint: DEEPGRAM_LISTEN_URL.to_string(),
            smart_format: true,
            diarize: true,
            utterances: true,
            interim_results: None,
            punctuate: None,
            endpointing: Some(10),
            extra_params: Vec::new(),
            extra_headers: Vec::new(),
            timeouts: StreamTimeouts::default(),
            outbound_queue: 32,
            reactor_tick: Duration::from_millis(100),
            max_reads_per_event: 16,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

impl DeepgramSTTConfig {
    /// Check the settings that would otherwise only fail at handshake time.
    pub fn validate(&self) -> Result<(), STTError> {
        if self.base.api_key.is_empty() {
            return Err(STTError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if self.base.encoding.is_empty() {
            return Err(STTError::ConfigurationError(
                "Audio encoding is required".to_string(),
            ));
        }
        if self.base.sample_rate == 0 {
            return Err(STTError::ConfigurationError(
                "Sample rate must be greater than zero".to_string(),
            ));
        }
        if self.base.channels == 0 {
            return Err(STTError::ConfigurationError(
                "Channel count must be greater than zero".to_string(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(STTError::ConfigurationError(
                "Outbound queue capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Model and feature flags, in the order they go on the wire.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |key: &str, value: String| params.push((key.to_string(), value));

        if !self.base.model.is_empty() {
            push("model", self.base.model.clone());
        }
        if !self.base.language.is_empty() {
            push("language", self.base.language.clone());
        }
        if let Some(endpointing) = self.endpointing {
            push("endpointing", endpointing.to_string());
        }
        push("smart_format", self.smart_format.to_string());
        push("diarize", self.diarize.to_string());
        push("utterances", self.utterances.to_string());
        if let Some(interim_results) = self.interim_results {
            push("interim_results", interim_results.to_string());
        }
        if let Some(punctuate) = self.punctuate {
            push("punctuate", punctuate.to_string());
        }

        params.extend(self.extra_params.iter().cloned());
        params
    }

    /// Handshake request carrying the `Token` auth header.
    pub fn connect_request(&self) -> ConnectRequest {
        let mut headers = vec![(
            "Authorization".to_string(),
            format!("Token {}", self.base.api_key),
        )];
        headers.extend(self.extra_headers.iter().cloned());

        ConnectRequest {
            endpoint: self.endpoint.clone(),
            headers,
            encoding: self.base.encoding.clone(),
            sample_rate: self.base.sample_rate,
            channels: self.base.channels,
            extra_params: self.query_params(),
        }
    }
}
