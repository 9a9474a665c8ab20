use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables fill in whatever the file leaves out.
///
/// # Example YAML structure
/// ```yaml
/// deepgram:
///   api_key: "your-deepgram-key"
///   url: "wss://api.deepgram.com/v1/listen"
///   model: "nova-2"
///   language: "en-US"
///   smart_format: true
///   diarize: true
///   utterances: true
///   interim_results: false
///   punctuate: true
///   endpointing: 10        # milliseconds, or false to disable
///
/// audio:
///   encoding: "linear16"
///   sample_rate: 16000
///   channels: 1
///   chunk_bytes: 3200
///
/// stream:
///   connect_timeout_seconds: 10
///   send_timeout_ms: 2000
///   write_timeout_seconds: 10
///   read_timeout_seconds: 10
///   outbound_queue: 32
///   max_reads_per_event: 16
///   max_pending_bytes: 1048576
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub deepgram: Option<DeepgramYaml>,
    pub audio: Option<AudioYaml>,
    pub stream: Option<StreamYaml>,
}

/// Deepgram provider settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeepgramYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub smart_format: Option<bool>,
    pub diarize: Option<bool>,
    pub utterances: Option<bool>,
    pub interim_results: Option<bool>,
    pub punctuate: Option<bool>,
    pub endpointing: Option<EndpointingYaml>,
}

/// `endpointing` accepts a silence threshold or a plain on/off switch
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EndpointingYaml {
    Millis(u32),
    Enabled(bool),
}

/// Audio format from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub chunk_bytes: Option<usize>,
}

/// Socket timeouts and buffer limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StreamYaml {
    pub connect_timeout_seconds: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub write_timeout_seconds: Option<u64>,
    pub read_timeout_seconds: Option<u64>,
    pub outbound_queue: Option<usize>,
    pub max_reads_per_event: Option<usize>,
    pub max_pending_bytes: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
deepgram:
  api_key: "dg-key"
  url: "ws://localhost:9000/v1/listen"
  model: "nova-3"
  language: "en-GB"
  smart_format: false
  diarize: false
  utterances: true
  interim_results: true
  punctuate: true
  endpointing: 250

audio:
  encoding: "mulaw"
  sample_rate: 8000
  channels: 1
  chunk_bytes: 1600

stream:
  connect_timeout_seconds: 5
  send_timeout_ms: 1000
  write_timeout_seconds: 3
  read_timeout_seconds: 4
  outbound_queue: 64
  max_reads_per_event: 8
  max_pending_bytes: 65536
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let deepgram = config.deepgram.as_ref().unwrap();
        assert_eq!(deepgram.api_key, Some("dg-key".to_string()));
        assert_eq!(deepgram.model, Some("nova-3".to_string()));
        assert_eq!(deepgram.smart_format, Some(false));
        assert_eq!(deepgram.endpointing, Some(EndpointingYaml::Millis(250)));

        let audio = config.audio.as_ref().unwrap();
        assert_eq!(audio.encoding, Some("mulaw".to_string()));
        assert_eq!(audio.sample_rate, Some(8000));
        assert_eq!(audio.chunk_bytes, Some(1600));

        let stream = config.stream.as_ref().unwrap();
        assert_eq!(stream.send_timeout_ms, Some(1000));
        assert_eq!(stream.outbound_queue, Some(64));
        assert_eq!(stream.max_pending_bytes, Some(65536));
    }

    #[test]
    fn test_endpointing_switch() {
        let config: YamlConfig =
            serde_yaml::from_str("deepgram:\n  endpointing: false\n").unwrap();
        assert_eq!(
            config.deepgram.unwrap().endpointing,
            Some(EndpointingYaml::Enabled(false))
        );
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
audio:
  sample_rate: 48000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.deepgram.is_none());
        assert!(config.stream.is_none());
        let audio = config.audio.as_ref().unwrap();
        assert_eq!(audio.sample_rate, Some(48000));
        assert!(audio.encoding.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.deepgram.is_none());
        assert!(config.audio.is_none());
        assert!(config.stream.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "deepgram:\n  model: \"nova-2\"\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.deepgram.as_ref().unwrap().model,
            Some("nova-2".to_string())
        );
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
