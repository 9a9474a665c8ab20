//! Message boundary recovery for the inbound byte stream.
//!
//! Frame boundaries carry no meaning for the protocol: one frame may hold
//! several JSON documents, and one document may span several frames. The
//! [`MessageAssembler`] keeps every byte it has not yet consumed and only
//! removes bytes once a complete value has been parsed from the front of the
//! buffer.

use serde_json::Value;
use serde_json::error::Category;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, warn};

use super::messages::TranscriptionMessage;
use crate::core::stt::base::STTError;

/// Default size of one read chunk, used as the accumulator's initial capacity.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 2048;

/// Default cap on bytes held while waiting for a value to complete.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 1024 * 1024;

// =============================================================================
// MessageAssembler
// =============================================================================

/// Byte accumulator that yields complete JSON values in arrival order.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
    max_pending_bytes: usize,
    /// Set while skipping the rest of a malformed value
    resync: Option<Resync>,
}

/// Brace-depth scanner used to step over a malformed value.
///
/// Depth and string state carry over between reads, so a bad value split
/// across frames is skipped as a whole and none of its nested objects are
/// mistaken for messages.
#[derive(Debug, Default, Clone, Copy)]
struct Resync {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Resync {
    /// Scan `bytes` and return the offset of the next top-level `{`.
    fn resume_point(&mut self, bytes: &[u8]) -> Option<usize> {
        for (index, &byte) in bytes.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'{' if self.depth == 0 => return Some(index),
                b'{' => self.depth += 1,
                b'}' => self.depth = self.depth.saturating_sub(1),
                b'"' if self.depth > 0 => self.in_string = true,
                _ => {}
            }
        }
        None
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_READ_CHUNK_SIZE, DEFAULT_MAX_PENDING_BYTES)
    }
}

impl MessageAssembler {
    pub fn new(initial_capacity: usize, max_pending_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(initial_capacity),
            max_pending_bytes,
            resync: None,
        }
    }

    /// Append one read chunk to the accumulator.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes read but not yet consumed into a message.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Extract the next complete value from the front of the accumulator.
    ///
    /// Returns `None` when the accumulator is empty or holds only the start of
    /// a value; those bytes stay in place for the next read. A value that can
    /// never parse is reported once as `ParseFailure` and then skipped as a
    /// whole, up to the next top-level `{`, so later messages are still
    /// reachable.
    pub fn next_value(&mut self) -> Option<Result<Value, STTError>> {
        if !self.skip_malformed() {
            return None;
        }

        let start = self
            .buffer
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buffer.len());
        if start == self.buffer.len() {
            self.buffer.clear();
            return None;
        }

        let mut values = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                self.buffer.drain(..consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.classify() == Category::Eof => {
                if self.buffer.len() > self.max_pending_bytes {
                    let dropped = self.buffer.len();
                    self.buffer.clear();
                    return Some(Err(STTError::ParseFailure(format!(
                        "Discarded {dropped} pending bytes without a complete message"
                    ))));
                }
                None
            }
            Some(Err(e)) => {
                // Step over the opening brace so the scan starts inside the value
                let mut resync = Resync::default();
                if self.buffer[start] == b'{' {
                    resync.depth = 1;
                }
                self.buffer.drain(..=start);
                self.resync = Some(resync);
                Some(Err(STTError::ParseFailure(format!("Discarded malformed JSON: {e}"))))
            }
            None => {
                self.buffer.clear();
                None
            }
        }
    }

    /// Drop bytes that still belong to a malformed value.
    ///
    /// Returns `false` when the whole accumulator was consumed and the
    /// malformed value has not ended yet.
    fn skip_malformed(&mut self) -> bool {
        let Some(mut resync) = self.resync.take() else {
            return true;
        };
        match resync.resume_point(&self.buffer) {
            Some(resume_at) => {
                self.buffer.drain(..resume_at);
                true
            }
            None => {
                debug!("Skipped {} bytes of a malformed message", self.buffer.len());
                self.buffer.clear();
                self.resync = Some(resync);
                false
            }
        }
    }
}

// =============================================================================
// ReceivePath
// =============================================================================

/// What one inbound frame meant for the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadEvent {
    /// Payload bytes appended to the accumulator
    Data(usize),
    /// Ping, pong or raw frame; nothing to assemble
    Control,
    /// The peer closed the connection
    Closed(Option<CloseFrame>),
}

/// Owns the accumulator and turns inbound frames into parsed messages.
#[derive(Debug, Default)]
pub struct ReceivePath {
    assembler: MessageAssembler,
}

impl ReceivePath {
    pub fn new(read_chunk_size: usize, max_pending_bytes: usize) -> Self {
        Self {
            assembler: MessageAssembler::new(read_chunk_size, max_pending_bytes),
        }
    }

    /// Append the payload of one inbound frame.
    pub fn ingest(&mut self, message: Message) -> ReadEvent {
        match message {
            Message::Text(text) => self.append(text.as_bytes()),
            Message::Binary(data) => self.append(&data),
            Message::Close(frame) => {
                debug!("Received close frame: {:?}", frame);
                ReadEvent::Closed(frame)
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => ReadEvent::Control,
        }
    }

    fn append(&mut self, payload: &[u8]) -> ReadEvent {
        if payload.is_empty() {
            return ReadEvent::Control;
        }
        self.assembler.push(payload);
        ReadEvent::Data(payload.len())
    }

    /// Extract and parse every complete message currently buffered, in order.
    pub fn drain(&mut self) -> Vec<Result<TranscriptionMessage, STTError>> {
        let mut parsed = Vec::new();
        while let Some(value) = self.assembler.next_value() {
            let message = value.and_then(|value| TranscriptionMessage::from_value(&value));
            if let Err(e) = &message {
                warn!("Discarding inbound message: {}", e);
            }
            parsed.push(message);
        }
        parsed
    }

    /// Bytes still waiting for the rest of their message.
    pub fn pending_bytes(&self) -> usize {
        self.assembler.pending().len()
    }
}
