//! Streaming transcription messages received from Deepgram.
//!
//! Every field is optional on the wire. Missing or mistyped fields fall back
//! to an empty string, zero, `false` or an empty list, so one odd field never
//! costs the whole message. Only a value that is not a JSON object at all is
//! rejected with [`STTError::ParseFailure`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::stt::base::STTError;

// =============================================================================
// Message Types
// =============================================================================

/// Request metadata attached to a streaming message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub transaction_key: String,
    pub request_id: String,
    pub sha256: String,
    pub created: String,
    /// Whole seconds; fractional durations are truncated
    pub duration: i64,
    pub channels: i64,
    pub models: Vec<String>,
}

/// One recognised word with timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

/// One transcript hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f64,
    pub words: Vec<Word>,
}

/// A search hit inside the audio.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hit {
    pub confidence: f64,
    pub start: f64,
    pub end: f64,
    pub snippet: String,
}

/// Search results for one query term.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Search {
    pub query: String,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channel {
    pub alternatives: Vec<Alternative>,
    pub search: Vec<Search>,
}

/// One interim or final transcript segment.
///
/// `is_final` marks the segment as settled. Interim segments may be
/// superseded by a later message covering the same time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptionMessage {
    pub metadata: Metadata,
    #[serde(rename = "type")]
    pub message_type: String,
    pub channel_index: Vec<i64>,
    pub duration: f64,
    pub start: f64,
    pub is_final: bool,
    pub speech_final: bool,
    pub channel: Channel,
}

impl TranscriptionMessage {
    /// The first alternative, if the service returned any.
    pub fn first_alternative(&self) -> Option<&Alternative> {
        self.channel.alternatives.first()
    }

    /// Transcript of the first alternative, empty when there is none.
    pub fn transcript(&self) -> &str {
        self.first_alternative()
            .map(|alt| alt.transcript.as_str())
            .unwrap_or("")
    }

    /// Map a decoded JSON value onto a message.
    pub fn from_value(value: &Value) -> Result<Self, STTError> {
        let object = value.as_object().ok_or_else(|| {
            STTError::ParseFailure(format!(
                "Expected a JSON object, got {}",
                json_kind(value)
            ))
        })?;

        let metadata = object
            .get("metadata")
            .and_then(Value::as_object)
            .map(parse_metadata)
            .unwrap_or_default();

        let channel = object
            .get("channel")
            .and_then(Value::as_object)
            .map(parse_channel)
            .unwrap_or_default();

        Ok(Self {
            metadata,
            message_type: str_field(object, "type"),
            channel_index: array_field(object, "channel_index", Value::as_i64),
            duration: f64_field(object, "duration"),
            start: f64_field(object, "start"),
            is_final: bool_field(object, "is_final"),
            speech_final: bool_field(object, "speech_final"),
            channel,
        })
    }
}

/// Decode a complete JSON document into a [`TranscriptionMessage`].
pub fn parse_message(text: &str) -> Result<TranscriptionMessage, STTError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| STTError::ParseFailure(format!("Invalid JSON: {e}")))?;
    TranscriptionMessage::from_value(&value)
}

// =============================================================================
// Field Mapping
// =============================================================================

fn parse_metadata(object: &Map<String, Value>) -> Metadata {
    Metadata {
        transaction_key: str_field(object, "transaction_key"),
        request_id: str_field(object, "request_id"),
        sha256: str_field(object, "sha256"),
        created: str_field(object, "created"),
        duration: int_field(object, "duration"),
        channels: int_field(object, "channels"),
        models: array_field(object, "models", |v| v.as_str().map(str::to_string)),
    }
}

fn parse_channel(object: &Map<String, Value>) -> Channel {
    Channel {
        alternatives: object_array(object, "alternatives", |alt| Alternative {
            transcript: str_field(alt, "transcript"),
            confidence: f64_field(alt, "confidence"),
            words: object_array(alt, "words", |word| Word {
                word: str_field(word, "word"),
                start: f64_field(word, "start"),
                end: f64_field(word, "end"),
                confidence: f64_field(word, "confidence"),
            }),
        }),
        search: object_array(object, "search", |search| Search {
            query: str_field(search, "query"),
            hits: object_array(search, "hits", |hit| Hit {
                confidence: f64_field(hit, "confidence"),
                start: f64_field(hit, "start"),
                end: f64_field(hit, "end"),
                snippet: str_field(hit, "snippet"),
            }),
        }),
    }
}

fn str_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f64_field(object: &Map<String, Value>, key: &str) -> f64 {
    object.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn int_field(object: &Map<String, Value>, key: &str) -> i64 {
    match object.get(key) {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        None => 0,
    }
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// Elements that do not convert are skipped rather than failing the message.
fn array_field<T>(
    object: &Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(&convert).collect())
        .unwrap_or_default()
}

fn object_array<T>(
    object: &Map<String, Value>,
    key: &str,
    convert: impl Fn(&Map<String, Value>) -> T,
) -> Vec<T> {
    array_field(object, key, |item| item.as_object().map(&convert))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
