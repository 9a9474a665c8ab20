use url::Url;

/// Validate that an API key is present
pub fn validate_api_key(api_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if api_key.trim().is_empty() {
        return Err(
            "DEEPGRAM_API_KEY is required (set it in the environment or deepgram.api_key in YAML)"
                .into(),
        );
    }
    Ok(())
}

/// Validate the streaming endpoint
///
/// The endpoint must parse as a URL with a `ws` or `wss` scheme and a host.
pub fn validate_endpoint(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(endpoint).map_err(|e| format!("Invalid endpoint '{endpoint}': {e}"))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!(
            "Endpoint '{endpoint}' must use ws:// or wss://, got {}://",
            url.scheme()
        )
        .into());
    }
    if url.host_str().is_none() {
        return Err(format!("Endpoint '{endpoint}' has no host").into());
    }

    Ok(())
}

/// Validate the audio format sent in the query string
pub fn validate_audio_format(
    encoding: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    if encoding.trim().is_empty() {
        return Err("Audio encoding cannot be empty".into());
    }
    if sample_rate == 0 {
        return Err("Audio sample rate must be greater than zero".into());
    }
    if channels == 0 {
        return Err("Audio channel count must be greater than zero".into());
    }
    Ok(())
}

/// Validate queue and chunk sizes
pub fn validate_stream_limits(
    outbound_queue: usize,
    max_reads_per_event: usize,
    audio_chunk_bytes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if outbound_queue == 0 {
        return Err("STREAM_OUTBOUND_QUEUE must be greater than zero".into());
    }
    if max_reads_per_event == 0 {
        return Err("STREAM_MAX_READS_PER_EVENT must be greater than zero".into());
    }
    if audio_chunk_bytes == 0 {
        return Err("AUDIO_CHUNK_BYTES must be greater than zero".into());
    }
    Ok(())
}
