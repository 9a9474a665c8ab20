use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::deepgram::TranscriptionMessage;

/// Error types for streaming STT operations
///
/// Only [`STTError::ConnectFailure`], [`STTError::AuthenticationFailed`] and
/// [`STTError::Closed`] end a session. Every other variant is isolated to the
/// operation that produced it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum STTError {
    #[error("Connect failure: {0}")]
    ConnectFailure(String),
    #[error("Send failure: {0}")]
    SendFailure(String),
    #[error("Receive failure: {0}")]
    ReceiveFailure(String),
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Connection is closed")]
    Closed,
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl STTError {
    /// Whether this error terminates the streaming session
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            STTError::ConnectFailure(_) | STTError::AuthenticationFailed(_) | STTError::Closed
        )
    }
}

/// Type alias for the result sink.
///
/// Invoked once per parsed message on the reactor task. The returned future is
/// awaited before the next message is delivered, so handlers must not block;
/// long-running work belongs on another task.
pub type STTResultCallback =
    Arc<dyn Fn(TranscriptionMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Type alias for STT error callback
pub type STTErrorCallback =
    Arc<dyn Fn(STTError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Base trait for streaming Speech-to-Text sessions
#[async_trait::async_trait]
pub trait BaseSTT: Send + Sync {
    /// Open the connection and start the reactor
    ///
    /// # Returns
    /// * `Result<(), STTError>` - `ConnectFailure` when the handshake does not
    ///   complete with HTTP 101
    async fn connect(&mut self) -> Result<(), STTError>;

    /// Close the session. Calling it more than once is a no-op.
    async fn disconnect(&mut self) -> Result<(), STTError>;

    /// Check if the connection is open and accepting audio
    fn is_ready(&self) -> bool;

    /// Current connection state
    fn connection_state(&self) -> STTConnectionState;

    /// Send one audio frame to the provider
    ///
    /// # Arguments
    /// * `audio_data` - Encoded audio bytes, transmitted as one binary frame
    ///
    /// # Returns
    /// * `Result<(), STTError>` - `SendFailure` if the frame was not accepted
    ///   in time, `Closed` after the session ended
    async fn send_audio(&self, audio_data: &[u8]) -> Result<(), STTError>;

    /// Register the result sink
    async fn on_result(&mut self, callback: STTResultCallback) -> Result<(), STTError>;

    /// Register a callback for non-fatal streaming errors
    async fn on_error(&mut self, callback: STTErrorCallback) -> Result<(), STTError>;

    /// Snapshot of the session statistics
    fn stats(&self) -> STTStats;

    /// Get provider-specific information
    fn get_provider_info(&self) -> &'static str;
}

/// Connection state for a streaming session
///
/// `Disconnected -> Connecting -> Open -> {Closing -> Closed | Failed}`.
/// A remote close moves `Open` straight to `Closed`. `Closed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum STTConnectionState {
    /// Not connected yet
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake completed with HTTP 101
    Open,
    /// Local close requested, reactor shutting down
    Closing,
    /// Socket released
    Closed,
    /// Handshake or transport failure
    Failed(String),
}

impl STTConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, STTConnectionState::Closed | STTConnectionState::Failed(_))
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &STTConnectionState) -> bool {
        use STTConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Open)
                | (Connecting, Failed(_))
                | (Open, Closing)
                | (Open, Closed)
                | (Open, Failed(_))
                | (Closing, Closed)
                | (Closing, Failed(_))
        )
    }
}

/// Statistics for a streaming session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct STTStats {
    /// Binary frames written to the socket
    pub frames_sent: u64,
    /// Audio bytes written to the socket
    pub bytes_sent: u64,
    /// Frames that were dropped by a failed or timed out write
    pub frames_dropped: u64,
    /// Messages delivered to the result sink
    pub messages_received: u64,
    /// Delivered messages flagged `is_final`
    pub final_messages: u64,
    /// Messages discarded by the assembler or parser
    pub parse_failures: u64,
    /// Read cycles that failed without closing the socket
    pub receive_failures: u64,
}

impl STTStats {
    /// Update statistics with a delivered message
    pub fn update_with_message(&mut self, message: &TranscriptionMessage) {
        self.messages_received += 1;
        if message.is_final {
            self.final_messages += 1;
        }
    }

    pub fn record_sent(&mut self, len: usize) {
        self.frames_sent += 1;
        self.bytes_sent += len as u64;
    }
}
