use std::env;
use std::str::FromStr;

use super::StreamConfig;
use super::merge::merge_config;
use super::utils::parse_bool;

pub const DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";
pub const DEEPGRAM_URL: &str = "DEEPGRAM_URL";
pub const DEEPGRAM_MODEL: &str = "DEEPGRAM_MODEL";
pub const DEEPGRAM_LANGUAGE: &str = "DEEPGRAM_LANGUAGE";
pub const DEEPGRAM_SMART_FORMAT: &str = "DEEPGRAM_SMART_FORMAT";
pub const DEEPGRAM_DIARIZE: &str = "DEEPGRAM_DIARIZE";
pub const DEEPGRAM_UTTERANCES: &str = "DEEPGRAM_UTTERANCES";
pub const DEEPGRAM_INTERIM_RESULTS: &str = "DEEPGRAM_INTERIM_RESULTS";
pub const DEEPGRAM_PUNCTUATE: &str = "DEEPGRAM_PUNCTUATE";
pub const DEEPGRAM_ENDPOINTING: &str = "DEEPGRAM_ENDPOINTING";
pub const AUDIO_ENCODING: &str = "AUDIO_ENCODING";
pub const AUDIO_SAMPLE_RATE: &str = "AUDIO_SAMPLE_RATE";
pub const AUDIO_CHANNELS: &str = "AUDIO_CHANNELS";
pub const AUDIO_CHUNK_BYTES: &str = "AUDIO_CHUNK_BYTES";
pub const STREAM_CONNECT_TIMEOUT_SECONDS: &str = "STREAM_CONNECT_TIMEOUT_SECONDS";
pub const STREAM_SEND_TIMEOUT_MS: &str = "STREAM_SEND_TIMEOUT_MS";
pub const STREAM_WRITE_TIMEOUT_SECONDS: &str = "STREAM_WRITE_TIMEOUT_SECONDS";
pub const STREAM_READ_TIMEOUT_SECONDS: &str = "STREAM_READ_TIMEOUT_SECONDS";
pub const STREAM_OUTBOUND_QUEUE: &str = "STREAM_OUTBOUND_QUEUE";
pub const STREAM_MAX_READS_PER_EVENT: &str = "STREAM_MAX_READS_PER_EVENT";
pub const STREAM_MAX_PENDING_BYTES: &str = "STREAM_MAX_PENDING_BYTES";

/// Every variable the configuration reads
#[cfg(test)]
pub const ALL_VARS: &[&str] = &[
    DEEPGRAM_API_KEY,
    DEEPGRAM_URL,
    DEEPGRAM_MODEL,
    DEEPGRAM_LANGUAGE,
    DEEPGRAM_SMART_FORMAT,
    DEEPGRAM_DIARIZE,
    DEEPGRAM_UTTERANCES,
    DEEPGRAM_INTERIM_RESULTS,
    DEEPGRAM_PUNCTUATE,
    DEEPGRAM_ENDPOINTING,
    AUDIO_ENCODING,
    AUDIO_SAMPLE_RATE,
    AUDIO_CHANNELS,
    AUDIO_CHUNK_BYTES,
    STREAM_CONNECT_TIMEOUT_SECONDS,
    STREAM_SEND_TIMEOUT_MS,
    STREAM_WRITE_TIMEOUT_SECONDS,
    STREAM_READ_TIMEOUT_SECONDS,
    STREAM_OUTBOUND_QUEUE,
    STREAM_MAX_READS_PER_EVENT,
    STREAM_MAX_PENDING_BYTES,
];

impl StreamConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Numeric or boolean variables are malformed
    /// - `DEEPGRAM_API_KEY` is missing
    /// - The endpoint, audio format or buffer limits are invalid
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        config.validate()?;

        Ok(config)
    }
}

/// Read a variable, treating empty values as unset
pub fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Read and parse a numeric variable
pub fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable '{value}': {e}").into()),
        None => Ok(None),
    }
}

/// Read a boolean variable (true/false, 1/0, yes/no)
pub fn bool_var(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match read_var(name) {
        Some(value) => parse_bool(value.trim()).map(Some).ok_or_else(|| {
            format!("Invalid {name} environment variable '{value}': expected a boolean").into()
        }),
        None => Ok(None),
    }
}
