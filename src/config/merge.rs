use super::StreamConfig;
use super::env::{self, bool_var, parse_var, read_var};
use super::utils::parse_endpointing;
use super::yaml::{EndpointingYaml, YamlConfig};
use crate::core::stt::DeepgramSTTConfig;

/// Bytes per host frame: 100ms of 16kHz mono linear16
const DEFAULT_AUDIO_CHUNK_BYTES: usize = 3200;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// This allows environment variables to provide base configuration while YAML
/// can override specific values per deployment.
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<StreamConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();
    let deepgram = yaml.deepgram.unwrap_or_default();
    let audio = yaml.audio.unwrap_or_default();
    let stream = yaml.stream.unwrap_or_default();
    let defaults = DeepgramSTTConfig::default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| read_var($env_var))
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| read_var($env_var))
        };
    }

    // Helper macro for parsed values: YAML > ENV (parsed) > Default
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => parse_var($env_var)?.unwrap_or($default),
            }
        };
    }

    // Helper macro for boolean flags: YAML > ENV (parsed) > Default
    macro_rules! get_flag {
        ($env_var:expr, $yaml_value:expr) => {
            match $yaml_value {
                Some(value) => Some(value),
                None => bool_var($env_var)?,
            }
        };
    }

    // Provider settings
    let api_key = get_value!(env::DEEPGRAM_API_KEY, deepgram.api_key, "");
    let endpoint = get_value!(env::DEEPGRAM_URL, deepgram.url, defaults.endpoint);
    let model = get_value!(env::DEEPGRAM_MODEL, deepgram.model, defaults.base.model);
    let language = get_optional!(env::DEEPGRAM_LANGUAGE, deepgram.language);

    // Audio format
    let encoding = get_value!(env::AUDIO_ENCODING, audio.encoding, defaults.base.encoding);
    let sample_rate = get_parsed!(
        env::AUDIO_SAMPLE_RATE,
        audio.sample_rate,
        defaults.base.sample_rate
    );
    let channels = get_parsed!(env::AUDIO_CHANNELS, audio.channels, defaults.base.channels);
    let audio_chunk_bytes = get_parsed!(
        env::AUDIO_CHUNK_BYTES,
        audio.chunk_bytes,
        DEFAULT_AUDIO_CHUNK_BYTES
    );

    // Feature flags
    let smart_format = get_flag!(env::DEEPGRAM_SMART_FORMAT, deepgram.smart_format)
        .unwrap_or(defaults.smart_format);
    let diarize = get_flag!(env::DEEPGRAM_DIARIZE, deepgram.diarize).unwrap_or(defaults.diarize);
    let utterances =
        get_flag!(env::DEEPGRAM_UTTERANCES, deepgram.utterances).unwrap_or(defaults.utterances);
    let interim_results = get_flag!(env::DEEPGRAM_INTERIM_RESULTS, deepgram.interim_results);
    let punctuate = get_flag!(env::DEEPGRAM_PUNCTUATE, deepgram.punctuate);

    let default_endpointing = defaults.endpointing.unwrap_or(10);
    let endpointing = match deepgram.endpointing {
        Some(EndpointingYaml::Millis(ms)) => Some(ms),
        Some(EndpointingYaml::Enabled(true)) => Some(default_endpointing),
        Some(EndpointingYaml::Enabled(false)) => None,
        None => match read_var(env::DEEPGRAM_ENDPOINTING) {
            Some(value) => parse_endpointing(value.trim(), default_endpointing)?,
            None => defaults.endpointing,
        },
    };

    // Socket timeouts
    let connect_timeout_seconds = get_parsed!(
        env::STREAM_CONNECT_TIMEOUT_SECONDS,
        stream.connect_timeout_seconds,
        defaults.timeouts.connect.as_secs()
    );
    let send_timeout_ms = get_parsed!(
        env::STREAM_SEND_TIMEOUT_MS,
        stream.send_timeout_ms,
        defaults.timeouts.send.as_millis() as u64
    );
    let write_timeout_seconds = get_parsed!(
        env::STREAM_WRITE_TIMEOUT_SECONDS,
        stream.write_timeout_seconds,
        defaults.timeouts.write.as_secs()
    );
    let read_timeout_seconds = get_parsed!(
        env::STREAM_READ_TIMEOUT_SECONDS,
        stream.read_timeout_seconds,
        defaults.timeouts.read.as_secs()
    );

    // Buffer limits
    let outbound_queue = get_parsed!(
        env::STREAM_OUTBOUND_QUEUE,
        stream.outbound_queue,
        defaults.outbound_queue
    );
    let max_reads_per_event = get_parsed!(
        env::STREAM_MAX_READS_PER_EVENT,
        stream.max_reads_per_event,
        defaults.max_reads_per_event
    );
    let max_pending_bytes = get_parsed!(
        env::STREAM_MAX_PENDING_BYTES,
        stream.max_pending_bytes,
        defaults.max_pending_bytes
    );

    Ok(StreamConfig {
        api_key,
        endpoint,
        model,
        language,
        encoding,
        sample_rate,
        channels,
        smart_format,
        diarize,
        utterances,
        interim_results,
        punctuate,
        endpointing,
        connect_timeout_seconds,
        send_timeout_ms,
        write_timeout_seconds,
        read_timeout_seconds,
        outbound_queue,
        max_reads_per_event,
        max_pending_bytes,
        audio_chunk_bytes,
    })
}
