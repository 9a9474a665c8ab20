use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use streamscribe::config::StreamConfig;
use streamscribe::core::stt::{STTConnectionState, STTError, logging_sink};
use streamscribe::core::{AudioBridge, AudioFormat, AudioFrame, deepgram_factory};

const USAGE: &str = "Usage: streamscribe [--config <file.yaml>] [<raw-audio-file>|-]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, honouring RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Handle CLI arguments
    let mut config_path: Option<PathBuf> = None;
    let mut input: Option<String> = None;

    let mut args = env::args();
    let _ = args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            other if other.starts_with('-') && other != "-" => {
                anyhow::bail!("Unknown option '{other}'. {USAGE}");
            }
            other => {
                if input.is_some() {
                    anyhow::bail!("Unexpected argument '{other}'. {USAGE}");
                }
                input = Some(other.to_string());
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => StreamConfig::from_file(path),
        None => StreamConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;

    let source: Box<dyn AsyncRead + Unpin + Send> = match input.as_deref() {
        None | Some("-") => Box::new(tokio::io::stdin()),
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .map_err(|e| anyhow!("Failed to open {path}: {e}"))?,
        ),
    };

    let mut bridge = AudioBridge::new(deepgram_factory(config.to_deepgram_config()));
    bridge.on_result(logging_sink());

    let streamed = tokio::select! {
        result = stream_audio(&mut bridge, source, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing session");
            Ok(())
        }
    };

    bridge
        .close()
        .await
        .map_err(|e| anyhow!("Failed to close session: {e}"))?;

    let stats = bridge.stats();
    info!(
        frames_sent = stats.frames_sent,
        bytes_sent = stats.bytes_sent,
        frames_dropped = stats.frames_dropped,
        final_messages = stats.final_messages,
        "Session finished"
    );

    streamed
}

/// Read `source` in fixed-size chunks and push each one through the bridge,
/// paced at the audio's real-time rate when the encoding allows it.
async fn stream_audio(
    bridge: &mut AudioBridge,
    mut source: Box<dyn AsyncRead + Unpin + Send>,
    config: &StreamConfig,
) -> anyhow::Result<()> {
    let format = AudioFormat {
        sample_rate: config.sample_rate,
        channels: config.channels,
    };
    let mut pacing = chunk_duration(config).map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    if pacing.is_none() {
        warn!(
            "No pacing for encoding '{}', sending as fast as possible",
            config.encoding
        );
    }

    let mut chunk = vec![0u8; config.audio_chunk_bytes];
    loop {
        let filled = read_chunk(&mut source, &mut chunk).await?;
        if filled == 0 {
            info!("End of audio input");
            return Ok(());
        }

        if let Some(ticker) = pacing.as_mut() {
            ticker.tick().await;
        }

        let frame = AudioFrame::new(chunk[..filled].to_vec(), format);
        match bridge.push(&frame).await {
            Ok(()) => {}
            // Dropped frame; the session carries on
            Err(STTError::SendFailure(e)) => warn!("Audio frame dropped: {}", e),
            Err(e) if closed_by_service(&e, &bridge.connection_state()) => {
                info!("Service closed the session, stopping audio input");
                return Ok(());
            }
            Err(e) => return Err(anyhow!("Streaming stopped: {e}")),
        }
    }
}

/// Whether a rejected push means the service ended the session cleanly.
fn closed_by_service(error: &STTError, state: &STTConnectionState) -> bool {
    matches!(error, STTError::Closed) && *state == STTConnectionState::Closed
}

/// Fill `chunk` from `source`, returning fewer bytes only at end of input.
async fn read_chunk(
    source: &mut (dyn AsyncRead + Unpin + Send),
    chunk: &mut [u8],
) -> anyhow::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        let read = source.read(&mut chunk[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Playback time of one chunk, for fixed-width encodings.
fn chunk_duration(config: &StreamConfig) -> Option<Duration> {
    let bytes_per_sample: u64 = match config.encoding.as_str() {
        "linear16" => 2,
        "linear32" => 4,
        "mulaw" | "alaw" => 1,
        _ => return None,
    };
    let bytes_per_second =
        u64::from(config.sample_rate) * u64::from(config.channels) * bytes_per_sample;
    if bytes_per_second == 0 {
        return None;
    }
    let period =
        Duration::from_micros(config.audio_chunk_bytes as u64 * 1_000_000 / bytes_per_second);
    (!period.is_zero()).then_some(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_close_ends_stream_cleanly() {
        assert!(closed_by_service(&STTError::Closed, &STTConnectionState::Closed));
    }

    #[test]
    fn test_failed_session_is_an_error() {
        let failed = STTConnectionState::Failed("connection reset".to_string());
        assert!(!closed_by_service(&STTError::Closed, &failed));
        assert!(!closed_by_service(
            &STTError::ConnectFailure("refused".to_string()),
            &failed
        ));
        assert!(!closed_by_service(
            &STTError::SendFailure("timed out".to_string()),
            &STTConnectionState::Open
        ));
    }
}
