//! Bridge from a raw audio source to a streaming STT session.
//!
//! The session is not created up front. The first [`AudioFrame`] decides the
//! sample rate and channel count, the session is built for that format and
//! connected, and every frame after that is forwarded as-is.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use crate::core::stt::{
    BaseSTT, DeepgramSTT, DeepgramSTTConfig, STTConnectionState, STTError, STTErrorCallback,
    STTResultCallback, STTStats,
};

/// Sample format of a raw audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One buffer of encoded audio from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub format: AudioFormat,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }
}

/// Builds an unconnected session for the format of the first frame.
pub type STTFactory =
    Arc<dyn Fn(AudioFormat) -> Result<Box<dyn BaseSTT>, STTError> + Send + Sync>;

/// Factory for Deepgram sessions that takes the audio format from the frame.
pub fn deepgram_factory(config: DeepgramSTTConfig) -> STTFactory {
    Arc::new(move |format: AudioFormat| {
        let mut config = config.clone();
        config.base.sample_rate = format.sample_rate;
        config.base.channels = format.channels;
        let stt = DeepgramSTT::new(config)?;
        Ok(Box::new(stt) as Box<dyn BaseSTT>)
    })
}

/// Lazily connected audio sink.
///
/// A failed start is terminal: the bridge never retries and every later
/// frame is rejected with `Closed`.
pub struct AudioBridge {
    factory: STTFactory,
    session: Option<Box<dyn BaseSTT>>,
    format: Option<AudioFormat>,
    failed: bool,
    result_callback: Option<STTResultCallback>,
    error_callback: Option<STTErrorCallback>,
}

impl AudioBridge {
    pub fn new(factory: STTFactory) -> Self {
        Self {
            factory,
            session: None,
            format: None,
            failed: false,
            result_callback: None,
            error_callback: None,
        }
    }

    /// Result sink handed to the session when it is created.
    pub fn on_result(&mut self, callback: STTResultCallback) {
        self.result_callback = Some(callback);
    }

    pub fn on_error(&mut self, callback: STTErrorCallback) {
        self.error_callback = Some(callback);
    }

    /// Format the session was started with, once started.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn connection_state(&self) -> STTConnectionState {
        match &self.session {
            Some(session) => session.connection_state(),
            None => STTConnectionState::Disconnected,
        }
    }

    pub fn stats(&self) -> STTStats {
        self.session
            .as_ref()
            .map(|session| session.stats())
            .unwrap_or_default()
    }

    /// Forward one frame, starting the session on the first call.
    pub async fn push(&mut self, frame: &AudioFrame) -> Result<(), STTError> {
        if self.failed {
            return Err(STTError::Closed);
        }

        if self.session.is_none() {
            self.start(frame.format).await?;
        } else if self.format != Some(frame.format) {
            warn!(
                "Ignoring audio format change to {} Hz x{} mid-session",
                frame.format.sample_rate, frame.format.channels
            );
        }

        match &self.session {
            Some(session) => session.send_audio(&frame.data).await,
            None => Err(STTError::Closed),
        }
    }

    async fn start(&mut self, format: AudioFormat) -> Result<(), STTError> {
        info!(
            "Starting STT session for {} Hz, {} channel(s)",
            format.sample_rate, format.channels
        );

        let mut session = match (self.factory)(format) {
            Ok(session) => session,
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };

        if let Some(callback) = self.result_callback.clone() {
            session.on_result(callback).await?;
        }
        if let Some(callback) = self.error_callback.clone() {
            session.on_error(callback).await?;
        }

        if let Err(e) = session.connect().await {
            warn!("STT session failed to start: {}", e);
            self.failed = true;
            return Err(e);
        }

        self.format = Some(format);
        self.session = Some(session);
        Ok(())
    }

    /// Close the session if one was started. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), STTError> {
        match self.session.as_mut() {
            Some(session) => session.disconnect().await,
            None => Ok(()),
        }
    }
}
