use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::assembler::ReceivePath;
use super::config::DeepgramSTTConfig;
use super::connection;
use super::messages::TranscriptionMessage;
use super::reactor::{EventLoop, Reactor, ReactorSettings, SessionShared, Waker};
use crate::core::stt::base::{
    BaseSTT, STTConnectionState, STTError, STTErrorCallback, STTResultCallback, STTStats,
};

// =============================================================================
// AudioSender
// =============================================================================

/// Cloneable handle for pushing audio into an open session from any task.
#[derive(Clone)]
pub struct AudioSender {
    tx: mpsc::Sender<Bytes>,
    waker: Waker,
    shared: Arc<SessionShared>,
    send_timeout: Duration,
}

impl AudioSender {
    /// Queue one binary frame for the reactor to write.
    ///
    /// Waits at most `send_timeout` for room in the outbound queue. On timeout
    /// the frame is dropped and `SendFailure` returned; the session stays
    /// open. After the session ends every call returns `Closed`.
    pub async fn send(&self, audio: &[u8]) -> Result<(), STTError> {
        if self.shared.is_closed() {
            return Err(STTError::Closed);
        }
        // A zero-length binary frame asks the service to finalize the stream
        if audio.is_empty() {
            debug!("Skipping empty audio buffer");
            return Ok(());
        }

        let permit = match timeout(self.send_timeout, self.tx.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(STTError::Closed),
            Err(_) => {
                let error = STTError::SendFailure(format!(
                    "Socket not writable within {}ms, dropped {} byte frame",
                    self.send_timeout.as_millis(),
                    audio.len()
                ));
                warn!("{}", error);
                self.shared.stats.write().frames_dropped += 1;
                return Err(error);
            }
        };

        permit.send(Bytes::copy_from_slice(audio));
        self.waker.wake();
        Ok(())
    }

    /// Force an immediate reactor iteration.
    pub fn wake(&self) {
        self.waker.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

// =============================================================================
// DeepgramSTT
// =============================================================================

/// Deepgram streaming session over a WebSocket.
///
/// ```text
/// let mut stt = DeepgramSTT::new(config)?;
/// stt.on_result(callback).await?;
/// stt.connect().await?;
/// stt.send_audio(&pcm).await?;
/// stt.disconnect().await?;
/// ```
///
/// One instance serves one session. After `disconnect`, or after the service
/// closes the connection, a new instance is needed.
pub struct DeepgramSTT {
    config: DeepgramSTTConfig,
    shared: Arc<SessionShared>,
    sender: Option<AudioSender>,
    event_loop: Option<EventLoop>,
}

impl DeepgramSTT {
    pub fn new(config: DeepgramSTTConfig) -> Result<Self, STTError> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(SessionShared::default()),
            sender: None,
            event_loop: None,
        })
    }

    pub fn config(&self) -> &DeepgramSTTConfig {
        &self.config
    }

    /// A sender for feeding audio from another task, once connected.
    pub fn sender(&self) -> Option<AudioSender> {
        self.sender.clone()
    }

    /// The reactor's waker, once connected.
    pub fn waker(&self) -> Option<Waker> {
        self.event_loop.as_ref().map(EventLoop::waker)
    }

    /// Close the session gracefully.
    ///
    /// Frames already accepted by `send` are written before the Close frame.
    /// Returns once the reactor has stopped; later calls do nothing.
    pub async fn close(&mut self) -> Result<(), STTError> {
        self.shared.mark_closed();
        self.sender = None;

        let Some(mut event_loop) = self.event_loop.take() else {
            return Ok(());
        };

        self.shared.transition(STTConnectionState::Closing);
        event_loop.stop().await;
        self.shared.transition(STTConnectionState::Closed);

        let stats = self.stats();
        info!(
            frames_sent = stats.frames_sent,
            frames_dropped = stats.frames_dropped,
            messages_received = stats.messages_received,
            "Disconnected from Deepgram STT"
        );
        Ok(())
    }

    fn reactor_settings(&self) -> ReactorSettings {
        ReactorSettings {
            write_timeout: self.config.timeouts.write,
            read_timeout: self.config.timeouts.read,
            tick: self.config.reactor_tick,
            max_reads_per_event: self.config.max_reads_per_event.max(1),
        }
    }
}

impl Drop for DeepgramSTT {
    fn drop(&mut self) {
        // Dropping the event loop signals the reactor to shut down
        self.shared.mark_closed();
    }
}

#[async_trait]
impl BaseSTT for DeepgramSTT {
    async fn connect(&mut self) -> Result<(), STTError> {
        if self.shared.is_closed() {
            return Err(STTError::Closed);
        }
        if !self.shared.transition(STTConnectionState::Connecting) {
            return Err(STTError::ConfigurationError(
                "Session has already been started".to_string(),
            ));
        }

        let request = self.config.connect_request();
        let connection = match connection::open(&request, self.config.timeouts.connect).await {
            Ok(connection) => connection,
            Err(e) => {
                self.shared
                    .transition(STTConnectionState::Failed(e.to_string()));
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.config.outbound_queue);
        let receive = ReceivePath::new(self.config.read_chunk_size, self.config.max_pending_bytes);
        let reactor = Reactor::new(
            connection,
            rx,
            receive,
            self.shared.clone(),
            self.reactor_settings(),
        );

        self.shared.transition(STTConnectionState::Open);
        let event_loop = EventLoop::spawn(move |waker, stop_rx| reactor.run(waker, stop_rx));

        self.sender = Some(AudioSender {
            tx,
            waker: event_loop.waker(),
            shared: self.shared.clone(),
            send_timeout: self.config.timeouts.send,
        });
        self.event_loop = Some(event_loop);

        info!("Connected to Deepgram STT");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), STTError> {
        self.close().await
    }

    fn is_ready(&self) -> bool {
        self.shared.state() == STTConnectionState::Open && !self.shared.is_closed()
    }

    fn connection_state(&self) -> STTConnectionState {
        self.shared.state()
    }

    async fn send_audio(&self, audio_data: &[u8]) -> Result<(), STTError> {
        match &self.sender {
            Some(sender) => sender.send(audio_data).await,
            None if self.shared.is_closed() => Err(STTError::Closed),
            None => Err(STTError::SendFailure("Not connected".to_string())),
        }
    }

    async fn on_result(&mut self, callback: STTResultCallback) -> Result<(), STTError> {
        *self.shared.result_callback.write() = Some(callback);
        Ok(())
    }

    async fn on_error(&mut self, callback: STTErrorCallback) -> Result<(), STTError> {
        *self.shared.error_callback.write() = Some(callback);
        Ok(())
    }

    fn stats(&self) -> STTStats {
        self.shared.stats.read().clone()
    }

    fn get_provider_info(&self) -> &'static str {
        "Deepgram STT WebSocket v1"
    }
}

// =============================================================================
// Result Sinks
// =============================================================================

/// Log the first alternative's transcript; final segments at info level.
pub(crate) fn log_transcript(message: &TranscriptionMessage) {
    let transcript = message.transcript();
    if transcript.is_empty() {
        return;
    }

    if message.is_final {
        info!(
            start = message.start,
            duration = message.duration,
            speech_final = message.speech_final,
            "Transcript: {}",
            transcript
        );
    } else {
        debug!(start = message.start, "Interim transcript: {}", transcript);
    }
}

/// Result sink that only logs, for hosts without their own consumer.
pub fn logging_sink() -> STTResultCallback {
    Arc::new(|message: TranscriptionMessage| {
        Box::pin(async move {
            log_transcript(&message);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DeepgramSTTConfig {
        let mut config = DeepgramSTTConfig::default();
        config.base.api_key = "test_key".to_string();
        config
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = DeepgramSTT::new(DeepgramSTTConfig::default());
        assert!(matches!(result, Err(STTError::AuthenticationFailed(_))));

        let stt = DeepgramSTT::new(test_config()).unwrap();
        assert_eq!(stt.connection_state(), STTConnectionState::Disconnected);
        assert!(!stt.is_ready());
        assert!(stt.sender().is_none());
        assert!(stt.waker().is_none());
        assert_eq!(stt.get_provider_info(), "Deepgram STT WebSocket v1");
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let stt = DeepgramSTT::new(test_config()).unwrap();
        let result = stt.send_audio(&[0u8; 320]).await;
        assert!(matches!(result, Err(STTError::SendFailure(_))));
    }

    #[tokio::test]
    async fn test_close_without_connect_is_idempotent() {
        let mut stt = DeepgramSTT::new(test_config()).unwrap();
        assert!(stt.close().await.is_ok());
        assert!(stt.close().await.is_ok());

        // The session is spent
        assert!(matches!(stt.send_audio(&[1, 2]).await, Err(STTError::Closed)));
        assert!(matches!(stt.connect().await, Err(STTError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_failure_is_terminal() {
        let mut config = test_config();
        config.endpoint = "ws://127.0.0.1:1/v1/listen".to_string();
        config.timeouts.connect = Duration::from_secs(2);

        let mut stt = DeepgramSTT::new(config).unwrap();
        let result = stt.connect().await;
        assert!(matches!(result, Err(STTError::ConnectFailure(_))));
        assert!(matches!(
            stt.connection_state(),
            STTConnectionState::Failed(_)
        ));
        assert!(matches!(stt.send_audio(&[1]).await, Err(STTError::Closed)));
    }

    #[tokio::test]
    async fn test_send_times_out_when_queue_is_full() {
        let shared = Arc::new(SessionShared::default());
        let (tx, _rx) = mpsc::channel(1);
        let sender = AudioSender {
            tx,
            waker: Waker::default(),
            shared: shared.clone(),
            send_timeout: Duration::from_millis(50),
        };

        assert!(sender.send(&[1, 2, 3]).await.is_ok());
        let result = sender.send(&[4, 5, 6]).await;
        assert!(matches!(result, Err(STTError::SendFailure(_))));
        assert_eq!(shared.stats.read().frames_dropped, 1);

        // Empty buffers are not frames
        assert!(sender.send(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let shared = Arc::new(SessionShared::default());
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sender = AudioSender {
            tx,
            waker: Waker::default(),
            shared,
            send_timeout: Duration::from_millis(50),
        };
        assert!(matches!(sender.send(&[1]).await, Err(STTError::Closed)));
    }

    #[tokio::test]
    async fn test_callbacks_are_stored() {
        let mut stt = DeepgramSTT::new(test_config()).unwrap();
        stt.on_result(logging_sink()).await.unwrap();
        let on_error: STTErrorCallback = Arc::new(|_error| {
            Box::pin(async move {}) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        stt.on_error(on_error).await.unwrap();
        assert!(stt.shared.result_callback.read().is_some());
        assert!(stt.shared.error_callback.read().is_some());
    }
}
