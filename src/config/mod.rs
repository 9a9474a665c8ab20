//! Configuration module for the streaming client
//!
//! This module handles configuration from various sources: YAML files and
//! environment variables. YAML values take precedence over environment
//! variables, which take precedence over built-in defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use streamscribe::config::StreamConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = StreamConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("streamscribe.yaml");
//! let config = StreamConfig::from_file(&config_path)?;
//!
//! println!("Streaming to {}", config.endpoint);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::stt::{DeepgramSTTConfig, STTConfig, StreamTimeouts};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;

/// Streaming client configuration
///
/// Contains everything needed to open one Deepgram streaming session:
/// - Credentials and endpoint
/// - Model and feature flags
/// - Audio format of the stream
/// - Socket timeouts and buffer limits
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    // Provider settings
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub language: Option<String>,

    // Audio format
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,

    // Feature flags
    pub smart_format: bool,
    pub diarize: bool,
    pub utterances: bool,
    pub interim_results: Option<bool>,
    pub punctuate: Option<bool>,
    pub endpointing: Option<u32>,

    // Socket timeouts
    pub connect_timeout_seconds: u64,
    pub send_timeout_ms: u64,
    pub write_timeout_seconds: u64,
    pub read_timeout_seconds: u64,

    // Buffer limits
    pub outbound_queue: usize,
    pub max_reads_per_event: usize,
    pub max_pending_bytes: usize,

    /// Bytes per frame when streaming from a file (3200 = 100ms of 16kHz mono linear16)
    pub audio_chunk_bytes: usize,
}

impl StreamConfig {
    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // The .env file is not loaded here; an explicit YAML file is the source of truth.
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;

        Ok(config)
    }

    /// Run every validation check on the loaded values
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_api_key(&self.api_key)?;
        validation::validate_endpoint(&self.endpoint)?;
        validation::validate_audio_format(&self.encoding, self.sample_rate, self.channels)?;
        validation::validate_stream_limits(
            self.outbound_queue,
            self.max_reads_per_event,
            self.audio_chunk_bytes,
        )?;
        Ok(())
    }

    /// Socket timeouts as durations
    pub fn timeouts(&self) -> StreamTimeouts {
        StreamTimeouts {
            connect: Duration::from_secs(self.connect_timeout_seconds),
            send: Duration::from_millis(self.send_timeout_ms),
            write: Duration::from_secs(self.write_timeout_seconds),
            read: Duration::from_secs(self.read_timeout_seconds),
        }
    }

    /// Build the provider configuration for one session
    pub fn to_deepgram_config(&self) -> DeepgramSTTConfig {
        DeepgramSTTConfig {
            base: STTConfig {
                api_key: self.api_key.clone(),
                language: self.language.clone().unwrap_or_default(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                encoding: self.encoding.clone(),
                model: self.model.clone(),
            },
            endpoint: self.endpoint.clone(),
            smart_format: self.smart_format,
            diarize: self.diarize,
            utterances: self.utterances,
            interim_results: self.interim_results,
            punctuate: self.punctuate,
            endpointing: self.endpointing,
            timeouts: self.timeouts(),
            outbound_queue: self.outbound_queue,
            max_reads_per_event: self.max_reads_per_event,
            max_pending_bytes: self.max_pending_bytes,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for name in env::ALL_VARS {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("DEEPGRAM_API_KEY", "env-key");
            std::env::set_var("DEEPGRAM_MODEL", "nova-3");
            std::env::set_var("AUDIO_SAMPLE_RATE", "8000");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
deepgram:
  api_key: "yaml-key"
  language: "en-US"
  interim_results: true
audio:
  channels: 2
stream:
  send_timeout_ms: 500
"#,
        )
        .unwrap();

        let config = StreamConfig::from_file(&config_path).unwrap();

        // YAML wins over env
        assert_eq!(config.api_key, "yaml-key");
        // Env fills what YAML leaves out
        assert_eq!(config.model, "nova-3");
        assert_eq!(config.sample_rate, 8000);
        // Defaults fill the rest
        assert_eq!(config.encoding, "linear16");
        assert_eq!(config.endpointing, Some(10));

        assert_eq!(config.language.as_deref(), Some("en-US"));
        assert_eq!(config.interim_results, Some(true));
        assert_eq!(config.channels, 2);
        assert_eq!(config.send_timeout_ms, 500);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_requires_api_key() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "audio:\n  sample_rate: 16000\n").unwrap();

        let result = StreamConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("DEEPGRAM_API_KEY")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        let result = StreamConfig::from_file(&PathBuf::from("/nonexistent/streamscribe.yaml"));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_to_deepgram_config() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("DEEPGRAM_API_KEY", "key");
            std::env::set_var("DEEPGRAM_LANGUAGE", "de");
            std::env::set_var("DEEPGRAM_ENDPOINTING", "false");
            std::env::set_var("STREAM_SEND_TIMEOUT_MS", "250");
        }

        let config = merge::merge_config(None).unwrap();
        let deepgram = config.to_deepgram_config();

        assert_eq!(deepgram.base.api_key, "key");
        assert_eq!(deepgram.base.language, "de");
        assert_eq!(deepgram.base.model, "nova-2");
        assert_eq!(deepgram.endpointing, None);
        assert_eq!(deepgram.timeouts.send, Duration::from_millis(250));
        assert_eq!(deepgram.timeouts.connect, Duration::from_secs(10));
        assert!(deepgram.validate().is_ok());

        let params = deepgram.query_params();
        assert!(params.contains(&("language".to_string(), "de".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "endpointing"));

        cleanup_env_vars();
    }
}
