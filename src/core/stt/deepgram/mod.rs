//! Deepgram streaming Speech-to-Text over WebSocket.
//!
//! The module is organized into focused submodules:
//!
//! - [`config`]: `DeepgramSTTConfig` and the query parameters it produces
//! - `connection`: the upgrade handshake (HTTP 101 or `ConnectFailure`)
//! - `reactor`: the task that owns the socket, plus [`EventLoop`] and [`Waker`]
//! - `assembler`: boundary recovery for JSON split or coalesced across frames
//! - `messages`: lenient mapping of inbound JSON to [`TranscriptionMessage`]
//! - `client`: the [`DeepgramSTT`] session handle and [`AudioSender`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::future::Future;
//! use std::pin::Pin;
//! use std::sync::Arc;
//!
//! use streamscribe::core::stt::{BaseSTT, DeepgramSTT, DeepgramSTTConfig, TranscriptionMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = DeepgramSTTConfig::default();
//!     config.base.api_key = "your-deepgram-api-key".to_string();
//!
//!     let mut stt = DeepgramSTT::new(config)?;
//!     stt.on_result(Arc::new(|message: TranscriptionMessage| {
//!         Box::pin(async move {
//!             println!("{}", message.transcript());
//!         }) as Pin<Box<dyn Future<Output = ()> + Send>>
//!     }))
//!     .await?;
//!
//!     stt.connect().await?;
//!     stt.send_audio(&[0u8; 3200]).await?;
//!     stt.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod assembler;
mod client;
pub mod config;
mod connection;
mod messages;
mod reactor;


pub use assembler::{
    DEFAULT_MAX_PENDING_BYTES, DEFAULT_READ_CHUNK_SIZE, MessageAssembler, ReadEvent, ReceivePath,
};
pub use client::{AudioSender, DeepgramSTT, logging_sink};
pub use config::{DEEPGRAM_LISTEN_URL, DeepgramSTTConfig, STTConfig, StreamTimeouts};
pub use connection::{ConnectRequest, Connection, open};
pub use messages::{
    Alternative, Channel, Hit, Metadata, Search, TranscriptionMessage, Word, parse_message,
};
pub use reactor::{EventLoop, Waker};
